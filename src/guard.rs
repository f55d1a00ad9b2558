//! RAII guard binding a snapshot to a lexical scope.

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;

use crate::reclaim::Reclaimer;
use crate::slot::CacheSlot;
use crate::source::Source;

/// RAII read guard pinning one thread's snapshot of one cell.
///
/// The outermost guard on a slot reconciles the thread's mirror against
/// the cell's source; nested guards taken while it is live reuse the
/// pinned snapshot unchanged, so every read inside the scope sees the
/// same version even as publishes land concurrently.
///
/// A guard borrows its cell, so it cannot outlive it, and it is neither
/// `Send` nor `Sync`: the slot it anchors belongs to the creating
/// thread alone. References obtained through the guard must not be
/// stashed beyond its scope; the borrow checker enforces that too.
///
/// Dereferencing panics when the cell was published empty; probe with
/// [`get`](Guard::get) or [`is_empty`](Guard::is_empty) first when the
/// cell is nullable.
pub struct Guard<'a, T> {
    slot: &'a CacheSlot<T>,
}

impl<'a, T: Send + Sync + 'static> Guard<'a, T> {
    /// Anchor a new guard on `slot`, reconciling on the 0 -> 1 ref-count
    /// transition and only then.
    pub(crate) fn enter(
        slot: &'a CacheSlot<T>,
        source: &Source<T>,
        reclaimer: Option<&Reclaimer>,
    ) -> Self {
        if slot.acquire() == 0 {
            slot.reconcile(source, reclaimer);
        }
        Guard { slot }
    }
}

impl<T> Guard<'_, T> {
    /// The snapshot, or `None` when the cell was published empty.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        let ptr = self.slot.raw_ptr();
        if ptr.is_null() {
            None
        } else {
            // SAFETY: while this guard is live the slot's ref count is
            // nonzero, so the load path leaves the retained handle in
            // place and the pointee stays alive.
            Some(unsafe { &*ptr })
        }
    }

    /// Whether the pinned snapshot is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slot.raw_ptr().is_null()
    }

    /// Number of live guards currently anchored on this thread's slot.
    ///
    /// Exposed for tests and diagnostics.
    #[inline]
    pub fn ref_count(&self) -> u64 {
        self.slot.ref_count()
    }

    /// Control handle for the slot's scheduled-release flag.
    #[inline]
    pub fn tls(&self) -> TlsControl<'_> {
        TlsControl {
            flag: self.slot.release_flag(),
        }
    }
}

impl<T> Deref for Guard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty snapshot"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Guard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("<empty>"),
        }
    }
}

impl<T> Drop for Guard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.slot.release();
    }
}

/// Manipulates a slot's scheduled-release flag while a guard is live.
///
/// Scheduling a release asks the outermost guard's drop to evict the
/// thread's cached snapshot: the retained handle is dropped and the next
/// read reconciles against the source from scratch. Useful for transient
/// worker threads that would otherwise pin a superseded value in their
/// slot long after they stop reading the cell.
pub struct TlsControl<'g> {
    flag: &'g Cell<bool>,
}

impl TlsControl<'_> {
    /// Request the slot clear on the outermost guard's drop.
    #[inline]
    pub fn schedule_release(&self) {
        self.flag.set(true);
    }

    /// Withdraw a previously scheduled release.
    #[inline]
    pub fn retain(&self) {
        self.flag.set(false);
    }

    /// Whether a release is currently scheduled.
    #[inline]
    pub fn release_scheduled(&self) -> bool {
        self.flag.get()
    }
}
