//! Atomic wrapper around a `Duration`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A `Duration` that can be shared between threads, stored as whole nanoseconds.
///
/// Durations longer than `u64::MAX` nanoseconds (about 584 years) saturate.
#[derive(Default)]
pub struct AtomicDuration {
    nanos: AtomicU64,
}

#[inline(always)]
fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl AtomicDuration {
    /// Create a new value holding `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(to_nanos(duration)),
        }
    }

    /// Atomically adds `duration` and returns the new value.
    pub fn add(&self, duration: Duration) -> Duration {
        let delta = to_nanos(duration);
        let prev = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(delta))
            })
            .unwrap_or_else(|n| n);
        Duration::from_nanos(prev.saturating_add(delta))
    }

    /// Stores `duration`.
    pub fn set(&self, duration: Duration) {
        self.nanos.store(to_nanos(duration), Ordering::Release);
    }

    /// Returns the current value.
    pub fn get(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    /// Stores `new` if the current value equals `current`; returns whether it did.
    pub fn compare_and_swap(&self, current: Duration, new: Duration) -> bool {
        self.nanos
            .compare_exchange(
                to_nanos(current),
                to_nanos(new),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl fmt::Debug for AtomicDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.get(), f)
    }
}

impl From<Duration> for AtomicDuration {
    fn from(duration: Duration) -> Self {
        Self::new(duration)
    }
}
