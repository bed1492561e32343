//! One-shot event that can be waited on by any number of threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A one-time event that may occur in the future.
///
/// `fire` is safe to call any number of times from any thread; only the first call has
/// an effect. Every waiter is released once it does.
#[derive(Default)]
pub struct OnceEvent {
    fired: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl OnceEvent {
    /// Create an event that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the event. Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Taking the lock orders this notification after any waiter's flag check.
        let _held = self.lock.lock();
        self.cond.notify_all();
        true
    }

    /// Returns whether the event has fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Blocks until the event has fired.
    pub fn wait(&self) {
        if self.has_fired() {
            return;
        }
        let mut held = self.lock.lock();
        while !self.has_fired() {
            self.cond.wait(&mut held);
        }
    }

    /// Blocks until the event has fired or `timeout` elapses. Returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.has_fired() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut held = self.lock.lock();
        while !self.has_fired() {
            if self.cond.wait_until(&mut held, deadline).timed_out() {
                return self.has_fired();
            }
        }
        true
    }
}

impl std::fmt::Debug for OnceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceEvent")
            .field("fired", &self.has_fired())
            .finish()
    }
}
