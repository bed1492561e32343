//! Run a closure at most once per period.

use std::time::{Duration, Instant};

use log::trace;
use parking_lot::Mutex;

use crate::atomic::AtomicDuration;

/// Runs a closure at most once per period, e.g. to rate-limit a refresh or a warning.
///
/// The period starts when a run finishes. Callers arriving while a run is in progress
/// wait for it and then skip their own closure.
pub struct Ontime {
    origin: Instant,
    /// Offset from `origin` before which no new run may start.
    ready_at: AtomicDuration,
    lock: Mutex<()>,
}

impl Ontime {
    /// Create an `Ontime` whose first run is allowed immediately.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            ready_at: AtomicDuration::default(),
            lock: Mutex::new(()),
        }
    }

    /// Runs `f` unless it already ran within the last `period`. Returns whether `f` ran.
    ///
    /// A run that panics still counts: the next run is not allowed before `period` has
    /// passed since the panic.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn run<F: FnOnce()>(&self, period: Duration, f: F) -> bool {
        assert!(!period.is_zero(), "period must be non-zero");
        if !self.is_ready() {
            return false;
        }

        let _held = self.lock.lock();
        if !self.is_ready() {
            return false;
        }
        let _deadline = Deadline {
            ontime: self,
            period,
        };
        f();
        true
    }

    /// Returns whether the next call to [`Ontime::run`] would run its closure.
    pub fn is_ready(&self) -> bool {
        self.origin.elapsed() >= self.ready_at.get()
    }
}

/// Records the next allowed run when dropped, including while unwinding from `f`.
struct Deadline<'a> {
    ontime: &'a Ontime,
    period: Duration,
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        let next = self.ontime.origin.elapsed().saturating_add(self.period);
        self.ontime.ready_at.set(next);
        trace!("ontime ran, next run allowed in {:?}", self.period);
    }
}

impl Default for Ontime {
    fn default() -> Self {
        Self::new()
    }
}
