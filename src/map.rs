//! SyncMap: a read-mostly concurrent map with a lock-free snapshot and a guarded overflow.
//!
//! Readers consult an immutable, atomically published snapshot without locking. Keys
//! that are not (yet) in the snapshot live in an overflow map behind a mutex. Once enough
//! lookups have paid for the lock, the overflow is promoted to be the next snapshot.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ahash::RandomState;
use crossbeam::epoch::{self, Atomic, Guard, Owned};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::slot::{Slot, Value};

type Slots<K, V, S> = HashMap<K, Arc<Slot<V>>, S>;

// ================================================================================================
// INTERNAL DATA STRUCTURES
// ================================================================================================

/// Immutable view published for lock-free readers.
struct Snapshot<K, V, S> {
    slots: Arc<Slots<K, V, S>>,
    amended: bool, // true if the overflow holds some key missing from `slots`
}

/// Mutable state guarded by the map lock.
struct Overflow<K, V, S> {
    slots: Option<Slots<K, V, S>>,
    misses: usize,
}

// ================================================================================================
// MAIN STRUCTURE
// ================================================================================================

/// Concurrent map tuned for read-mostly workloads with a stable key set.
///
/// Loads of keys present in the current snapshot never take a lock. Stores to such keys
/// are a single compare-and-swap. Only keys that are new since the last promotion go
/// through the mutex, and the miss counter bounds how long they stay there.
pub struct SyncMap<K, V, S = RandomState> {
    read: Atomic<Snapshot<K, V, S>>,
    dirty: Mutex<Overflow<K, V, S>>,
    hasher: S,
}

// ================================================================================================
// CONSTRUCTORS
// ================================================================================================

impl<K: Eq + Hash + Clone, V: Clone> SyncMap<K, V, RandomState> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K: Eq + Hash + Clone, V: Clone, S: BuildHasher + Clone> SyncMap<K, V, S> {
    /// Create an empty map using the provided hasher.
    ///
    /// The hasher is cloned into every snapshot and overflow map the map builds.
    pub fn with_hasher(hasher: S) -> Self {
        let snapshot = Snapshot {
            slots: Arc::new(HashMap::with_hasher(hasher.clone())),
            amended: false,
        };
        Self {
            read: Atomic::new(snapshot),
            dirty: Mutex::new(Overflow {
                slots: None,
                misses: 0,
            }),
            hasher,
        }
    }

    // ============================================================================================
    // PUBLIC API METHODS
    // ============================================================================================

    /// Returns a clone of the value stored for `key`, if any.
    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &epoch::pin();
        let read = self.snapshot(guard);
        if let Some(slot) = read.slots.get(key) {
            return slot.load(guard).cloned();
        }
        if !read.amended {
            return None;
        }

        let slot = {
            let mut dirty = self.dirty.lock();
            // Avoid reporting a spurious miss if the overflow got promoted while we
            // were blocked on the lock.
            let read = self.snapshot(guard);
            match read.slots.get(key) {
                Some(slot) => Some(Arc::clone(slot)),
                None if read.amended => {
                    let slot = dirty.slots.as_ref().and_then(|m| m.get(key)).cloned();
                    // Record a miss whether or not the key was found: it keeps taking
                    // the slow path until the overflow is promoted.
                    self.miss_locked(&mut dirty, guard);
                    slot
                }
                None => None,
            }
        };
        slot.and_then(|slot| slot.load(guard).cloned())
    }

    /// Returns whether a value is currently stored for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.load(key).is_some()
    }

    /// Sets the value for `key`.
    pub fn store(&self, key: K, value: V) {
        let guard = &epoch::pin();
        let mut value = Owned::new(Value(value));

        let read = self.snapshot(guard);
        if let Some(slot) = read.slots.get(&key) {
            match slot.try_store(value, guard) {
                Ok(()) => return,
                Err(back) => value = back,
            }
        }

        let mut dirty = self.dirty.lock();
        let read = self.snapshot(guard);
        if let Some(slot) = read.slots.get(&key) {
            if slot.unexpunge_locked(guard) {
                // The slot was expunged, so an overflow map exists and lacks this key.
                self.dirty_slots(&mut dirty).insert(key, Arc::clone(slot));
            }
            slot.store_locked(value, guard);
        } else if let Some(slot) = dirty.slots.as_ref().and_then(|m| m.get(&key)) {
            slot.store_locked(value, guard);
        } else {
            if !read.amended {
                // First new key since the last promotion.
                self.fork_locked(&mut dirty, read, guard);
            }
            self.dirty_slots(&mut dirty).insert(key, Arc::new(Slot::new(value)));
        }
    }

    /// Returns the existing value for `key` if present; otherwise stores `value`.
    ///
    /// The boolean is `true` if the value was loaded, `false` if it was stored.
    pub fn load_or_store(&self, key: K, mut value: V) -> (V, bool) {
        let guard = &epoch::pin();

        // Avoid locking on a clean hit.
        let read = self.snapshot(guard);
        if let Some(slot) = read.slots.get(&key) {
            match slot.try_load_or_store(value, guard) {
                Ok((actual, loaded)) => return (actual.clone(), loaded),
                Err(back) => value = back,
            }
        }

        let (slot, actual, loaded) = {
            let mut dirty = self.dirty.lock();
            let read = self.snapshot(guard);
            if let Some(slot) = read.slots.get(&key) {
                let slot = Arc::clone(slot);
                if slot.unexpunge_locked(guard) {
                    self.dirty_slots(&mut dirty).insert(key, Arc::clone(&slot));
                }
                let (actual, loaded) = slot.load_or_store_locked(value, guard);
                (slot, actual, loaded)
            } else if let Some(slot) = dirty
                .slots
                .as_ref()
                .and_then(|m| m.get(&key))
                .cloned()
            {
                let (actual, loaded) = slot.load_or_store_locked(value, guard);
                self.miss_locked(&mut dirty, guard);
                (slot, actual, loaded)
            } else {
                if !read.amended {
                    self.fork_locked(&mut dirty, read, guard);
                }
                let slot = Arc::new(Slot::empty());
                let (actual, loaded) = slot.load_or_store_locked(value, guard);
                self.dirty_slots(&mut dirty).insert(key, Arc::clone(&slot));
                (slot, actual, loaded)
            }
        };
        // `slot` keeps the cell alive while the value is cloned outside the lock.
        let actual = actual.clone();
        drop(slot);
        (actual, loaded)
    }

    /// Deletes the value for `key`, returning it if there was one.
    pub fn load_and_delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &epoch::pin();
        let read = self.snapshot(guard);
        if let Some(slot) = read.slots.get(key) {
            return slot.delete(guard).cloned();
        }
        if !read.amended {
            return None;
        }

        let slot = {
            let mut dirty = self.dirty.lock();
            let read = self.snapshot(guard);
            match read.slots.get(key) {
                Some(slot) => Some(Arc::clone(slot)),
                None if read.amended => {
                    let slot = dirty.slots.as_mut().and_then(|m| m.remove(key));
                    self.miss_locked(&mut dirty, guard);
                    slot
                }
                None => None,
            }
        };
        slot.and_then(|slot| slot.delete(guard).cloned())
    }

    /// Deletes the value for `key`.
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _ = self.load_and_delete(key);
    }

    /// Calls `f` for each key and value present in the map, stopping when it returns
    /// `false`.
    ///
    /// No key is visited more than once. Keys stored or deleted concurrently may or may
    /// not be visited. `f` may call back into the map, including `range` itself.
    ///
    /// The values handed to `f` are protected from reclamation for the duration of the
    /// whole iteration, so long-running callbacks delay freeing of replaced values.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let guard = &epoch::pin();
        let mut read = self.snapshot(guard);
        if read.amended {
            // The overflow has keys the snapshot lacks. Range is O(n) anyway, so a full
            // promotion is amortized by this very call.
            let mut dirty = self.dirty.lock();
            read = self.snapshot(guard);
            if read.amended {
                debug!("range promoting overflow ({} misses pending)", dirty.misses);
                read = self.promote_locked(&mut dirty, guard);
            }
        }

        for (key, slot) in read.slots.iter() {
            let Some(value) = slot.load(guard) else {
                continue;
            };
            if !f(key, value) {
                break;
            }
        }
    }

    /// Returns an iterator over cloned key-value pairs present at the moment of call.
    pub fn iter(&self) -> std::vec::IntoIter<(K, V)> {
        let mut pairs = Vec::new();
        self.range(|k, v| {
            pairs.push((k.clone(), v.clone()));
            true
        });
        pairs.into_iter()
    }

    // ============================================================================================
    // SNAPSHOT AND OVERFLOW MAINTENANCE
    // ============================================================================================

    #[inline(always)]
    fn snapshot<'g>(&'g self, guard: &'g Guard) -> &'g Snapshot<K, V, S> {
        let read = self.read.load(Ordering::Acquire, guard);
        // SAFETY: `read` is never null and replaced snapshots are retired through the
        // epoch collector, so it stays valid for the lifetime of `guard`.
        unsafe { read.deref() }
    }

    /// Replaces the published snapshot. Caller holds the map lock.
    fn publish_locked<'g>(
        &self,
        snapshot: Snapshot<K, V, S>,
        guard: &'g Guard,
    ) -> &'g Snapshot<K, V, S> {
        let new = Owned::new(snapshot).into_shared(guard);
        let old = self.read.swap(new, Ordering::AcqRel, guard);
        // SAFETY: `old` is unlinked; readers that still hold it are pinned.
        unsafe {
            guard.defer_destroy(old);
            new.deref()
        }
    }

    /// Overflow map, created empty if absent.
    fn dirty_slots<'a>(&self, dirty: &'a mut Overflow<K, V, S>) -> &'a mut Slots<K, V, S> {
        dirty
            .slots
            .get_or_insert_with(|| HashMap::with_hasher(self.hasher.clone()))
    }

    /// Builds the overflow map from `read`, expunging empty slots, and republishes
    /// `read`'s slots marked as amended.
    fn fork_locked(
        &self,
        dirty: &mut Overflow<K, V, S>,
        read: &Snapshot<K, V, S>,
        guard: &Guard,
    ) {
        if dirty.slots.is_none() {
            let mut slots =
                HashMap::with_capacity_and_hasher(read.slots.len(), self.hasher.clone());
            for (key, slot) in read.slots.iter() {
                if !slot.try_expunge_locked(guard) {
                    slots.insert(key.clone(), Arc::clone(slot));
                }
            }
            trace!(
                "forked overflow: {} live of {} snapshot slots",
                slots.len(),
                read.slots.len()
            );
            dirty.slots = Some(slots);
        }
        self.publish_locked(
            Snapshot {
                slots: Arc::clone(&read.slots),
                amended: true,
            },
            guard,
        );
    }

    fn miss_locked(&self, dirty: &mut Overflow<K, V, S>, guard: &Guard) {
        dirty.misses += 1;
        let len = dirty.slots.as_ref().map_or(0, HashMap::len);
        if dirty.misses < len {
            return;
        }
        self.promote_locked(dirty, guard);
    }

    /// Publishes the overflow map as the new snapshot and resets the miss counter.
    fn promote_locked<'g>(
        &self,
        dirty: &mut Overflow<K, V, S>,
        guard: &'g Guard,
    ) -> &'g Snapshot<K, V, S> {
        let slots = match dirty.slots.take() {
            Some(slots) => slots,
            None => HashMap::with_hasher(self.hasher.clone()),
        };
        trace!(
            "promoting overflow: {} slots after {} misses",
            slots.len(),
            dirty.misses
        );
        dirty.misses = 0;
        self.publish_locked(
            Snapshot {
                slots: Arc::new(slots),
                amended: false,
            },
            guard,
        )
    }
}

// ================================================================================================
// DROP IMPLEMENTATIONS
// ================================================================================================

impl<K, V, S> Drop for SyncMap<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees no reader is using the current snapshot; older
        // snapshots were handed to the collector when they were replaced.
        unsafe {
            let guard = epoch::unprotected();
            let read = self.read.load(Ordering::Relaxed, guard);
            if !read.is_null() {
                drop(read.into_owned());
            }
        }
    }
}

// ================================================================================================
// STANDARD TRAIT IMPLEMENTATIONS
// ================================================================================================

impl<K: Eq + Hash + Clone, V: Clone, S: BuildHasher + Clone + Default> Default
    for SyncMap<K, V, S>
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for SyncMap<K, V, S>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.range(|k, v| {
            map.entry(k, v);
            true
        });
        map.finish()
    }
}

impl<'a, K: Eq + Hash + Clone, V: Clone, S: BuildHasher + Clone> IntoIterator
    for &'a SyncMap<K, V, S>
{
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Eq + Hash + Clone, V: Clone, S: BuildHasher + Clone + Default> FromIterator<(K, V)>
    for SyncMap<K, V, S>
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map = SyncMap::with_hasher(S::default());
        for (k, v) in iter {
            map.store(k, v);
        }
        map
    }
}

impl<K: Eq + Hash + Clone, V: Clone, S: BuildHasher + Clone> Extend<(K, V)>
    for SyncMap<K, V, S>
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.store(k, v);
        }
    }
}
