//! Typed object pool recycling resettable objects.

use std::fmt;

use crossbeam::queue::ArrayQueue;

/// Default number of idle objects a pool keeps.
const DEFAULT_POOL_SIZE: usize = 64;

/// Objects that can be returned to a [`Pool`] must be able to clear their state.
pub trait Reset {
    fn reset(&mut self);
}

impl<T> Reset for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Pool of reusable objects.
///
/// `get` hands out an idle object or builds a new one with the factory. `put` resets
/// the object and keeps it if the pool has room, otherwise drops it.
pub struct Pool<T> {
    idle: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Reset> Pool<T> {
    /// Create a pool holding up to 64 idle objects built by `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_capacity(factory, DEFAULT_POOL_SIZE)
    }

    /// Create a pool keeping at most `capacity` idle objects.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity<F>(factory: F, capacity: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            idle: ArrayQueue::new(capacity),
            factory: Box::new(factory),
        }
    }

    /// Takes an idle object, or builds a fresh one when none is left.
    pub fn get(&self) -> T {
        match self.idle.pop() {
            Some(value) => value,
            None => (self.factory)(),
        }
    }

    /// Resets `value` and returns it to the pool.
    pub fn put(&self, mut value: T) {
        value.reset();
        // Full pool: let the object drop.
        let _ = self.idle.push(value);
    }

    /// Number of idle objects currently held.
    pub fn len(&self) -> usize {
        self.idle.len()
    }

    /// Returns whether no idle object is held.
    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle.len())
            .field("capacity", &self.idle.capacity())
            .finish()
    }
}
