use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use syncmap_rs::Ontime;

#[test]
fn runs_once_per_period() {
    let o = Ontime::new();
    let mut runs = 0;
    assert!(o.run(Duration::from_millis(100), || runs += 1));
    assert!(!o.run(Duration::from_millis(100), || runs += 1));
    assert!(!o.is_ready());
    assert_eq!(runs, 1);

    thread::sleep(Duration::from_millis(150));
    assert!(o.is_ready());
    assert!(o.run(Duration::from_millis(100), || runs += 1));
    assert_eq!(runs, 2);
}

#[test]
fn concurrent_callers_run_once() {
    let o = Arc::new(Ontime::new());
    let count = Arc::new(AtomicUsize::new(0));
    let n = 8;
    let barrier = Arc::new(Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let o = o.clone();
            let c = count.clone();
            let b = barrier.clone();
            thread::spawn(move || {
                b.wait();
                o.run(Duration::from_secs(60), || {
                    thread::sleep(Duration::from_millis(5));
                    c.fetch_add(1, Ordering::SeqCst);
                });
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_run_counts_as_run() {
    let o = Ontime::new();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        o.run(Duration::from_secs(1), || panic!("failed"));
    }));
    assert!(result.is_err());

    assert!(!o.is_ready());
    let mut called = false;
    assert!(!o.run(Duration::from_secs(1), || called = true));
    assert!(!called);
}

#[test]
#[should_panic(expected = "period must be non-zero")]
fn zero_period_panics() {
    Ontime::new().run(Duration::ZERO, || {});
}
