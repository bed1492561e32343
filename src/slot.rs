//! Per-key atomic cell shared between snapshot generations and the overflow map.
//!
//! A slot is a single tagged atomic pointer:
//!
//! | pointer  | tag | state            |
//! |----------|-----|------------------|
//! | null     | 0   | empty            |
//! | null     | 1   | expunged         |
//! | non-null | 0   | present(value)   |
//!
//! Replaced values are retired through the epoch collector, so a `&V` obtained under a
//! guard stays valid until that guard is dropped even if another thread overwrites or
//! deletes the slot meanwhile.

use std::sync::atomic::Ordering;

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};

/// Tag marking an expunged slot. Only ever combined with a null pointer.
const EXPUNGED_TAG: usize = 1;

/// Heap cell holding one value.
///
/// Over-aligned so the low pointer bits are always free for the expunged tag, whatever
/// the alignment of `V`.
#[repr(align(4))]
pub(crate) struct Value<V>(pub(crate) V);

/// Per-key atomic cell: empty, present or expunged.
pub(crate) struct Slot<V> {
    p: Atomic<Value<V>>,
}

#[inline(always)]
fn is_expunged<V>(p: Shared<'_, Value<V>>) -> bool {
    p.is_null() && p.tag() == EXPUNGED_TAG
}

#[inline(always)]
fn expunged<'g, V>() -> Shared<'g, Value<V>> {
    Shared::null().with_tag(EXPUNGED_TAG)
}

impl<V> Slot<V> {
    /// New slot already holding `value`.
    pub(crate) fn new(value: Owned<Value<V>>) -> Self {
        Self {
            p: Atomic::from(value),
        }
    }

    /// New slot with no value.
    pub(crate) fn empty() -> Self {
        Self { p: Atomic::null() }
    }

    /// Returns the current value, or `None` when empty or expunged.
    #[inline]
    pub(crate) fn load<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        let p = self.p.load(Ordering::Acquire, guard);
        // SAFETY: non-null pointers are live values; retirement is deferred past `guard`.
        unsafe { p.as_ref() }.map(|v| &v.0)
    }

    /// Stores `value` unless the slot is expunged, in which case the value is handed back.
    pub(crate) fn try_store(
        &self,
        mut value: Owned<Value<V>>,
        guard: &Guard,
    ) -> Result<(), Owned<Value<V>>> {
        let mut p = self.p.load(Ordering::Acquire, guard);
        loop {
            if is_expunged(p) {
                return Err(value);
            }
            match self
                .p
                .compare_exchange(p, value, Ordering::AcqRel, Ordering::Acquire, guard)
            {
                Ok(_) => {
                    retire(p, guard);
                    return Ok(());
                }
                Err(e) => {
                    p = e.current;
                    value = e.new;
                }
            }
        }
    }

    /// Clears the expunged mark, reporting whether it was set.
    ///
    /// Must be called with the map lock held; a slot that was expunged has to be
    /// re-inserted into the overflow map before the lock is released.
    pub(crate) fn unexpunge_locked(&self, guard: &Guard) -> bool {
        self.p
            .compare_exchange(
                expunged(),
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            )
            .is_ok()
    }

    /// Unconditionally stores `value`. The slot must not be expunged, which only holds
    /// while the map lock is held.
    pub(crate) fn store_locked(&self, value: Owned<Value<V>>, guard: &Guard) {
        let old = self.p.swap(value, Ordering::AcqRel, guard);
        retire(old, guard);
    }

    /// Loads the current value, or stores `value` if the slot is empty.
    ///
    /// Returns `(actual, loaded)` on success. Fails only when the slot is expunged, in
    /// which case `value` is handed back untouched.
    pub(crate) fn try_load_or_store<'g>(
        &self,
        value: V,
        guard: &'g Guard,
    ) -> Result<(&'g V, bool), V> {
        let p = self.p.load(Ordering::Acquire, guard);
        if is_expunged(p) {
            return Err(value);
        }
        // SAFETY: see `load`.
        if let Some(v) = unsafe { p.as_ref() } {
            return Ok((&v.0, true));
        }

        // Allocate only once we know we may have to store.
        let mut owned = Owned::new(Value(value));
        loop {
            match self.p.compare_exchange(
                Shared::null(),
                owned,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                // SAFETY: `stored` was just installed and cannot be retired before `guard`.
                Ok(stored) => return Ok((unsafe { &stored.deref().0 }, false)),
                Err(e) => {
                    if is_expunged(e.current) {
                        return Err(e.new.into_box().0);
                    }
                    // SAFETY: see `load`.
                    if let Some(v) = unsafe { e.current.as_ref() } {
                        return Ok((&v.0, true));
                    }
                    owned = e.new;
                }
            }
        }
    }

    /// Like [`Slot::try_load_or_store`] for callers holding the map lock, where the
    /// slot has already been un-expunged or came from the overflow map.
    ///
    /// # Panics
    ///
    /// Panics if the slot is expunged.
    pub(crate) fn load_or_store_locked<'g>(
        &self,
        value: V,
        guard: &'g Guard,
    ) -> (&'g V, bool) {
        match self.try_load_or_store(value, guard) {
            Ok(found) => found,
            // Only the lock holder expunges, and it un-expunges before calling this.
            Err(_) => unreachable!("load_or_store_locked on an expunged slot"),
        }
    }

    /// Empties the slot, returning the value it held.
    pub(crate) fn delete<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        let mut p = self.p.load(Ordering::Acquire, guard);
        loop {
            if p.is_null() {
                return None;
            }
            match self.p.compare_exchange(
                p,
                Shared::null(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: destruction of `p` is deferred past `guard`.
                    let value = unsafe { &p.deref().0 };
                    retire(p, guard);
                    return Some(value);
                }
                Err(e) => p = e.current,
            }
        }
    }

    /// Marks an empty slot as expunged. Returns whether the slot ends up expunged,
    /// i.e. `false` only when it holds a value.
    ///
    /// Called with the map lock held while the overflow map is rebuilt from a snapshot.
    pub(crate) fn try_expunge_locked(&self, guard: &Guard) -> bool {
        let mut p = self.p.load(Ordering::Acquire, guard);
        while p.is_null() && !is_expunged(p) {
            match self.p.compare_exchange(
                p,
                expunged(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(e) => p = e.current,
            }
        }
        is_expunged(p)
    }
}

/// Defers destruction of a value that was swapped out of a slot.
#[inline]
fn retire<V>(p: Shared<'_, Value<V>>, guard: &Guard) {
    if !p.is_null() {
        // SAFETY: `p` is unlinked and no new reference to it can be created.
        unsafe { guard.defer_destroy(p) };
    }
}

impl<V> Drop for Slot<V> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach this slot any more.
        unsafe {
            let guard = epoch::unprotected();
            let p = self.p.load(Ordering::Relaxed, guard);
            if !p.is_null() {
                drop(p.into_owned());
            }
        }
    }
}
