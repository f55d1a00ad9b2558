//! Per-(cell, thread) cache slots and the local reader that drives them.
//!
//! Each thread touching a cell gets exactly one [`CacheSlot`] out of the
//! cell's `ThreadLocal` arena. The slot memoizes the last (version, value)
//! pair the thread reconciled to and carries the guard ref count that
//! enforces snapshot isolation for nested reads.

use std::cell::Cell;
use std::ptr;
use std::sync::Arc;

use thread_local::ThreadLocal;

use crate::guard::Guard;
use crate::reclaim::Reclaimer;
use crate::source::Source;

/// One thread's cached view of one cell.
///
/// All fields are `Cell`s: a slot is created by its owning thread and
/// never handed to another, so plain single-threaded interior mutability
/// is enough. While any guard is live (`ref_count > 0`) the load path
/// leaves `version`/`ptr`/`retained` untouched; that is what fixes the
/// snapshot for the whole scope.
pub(crate) struct CacheSlot<T> {
    /// Has this thread ever reconciled against the cell's source?
    init: Cell<bool>,
    /// The version this thread last reconciled to.
    version: Cell<u64>,
    /// Dereferenceable pointer into the retained value; null when the
    /// cached snapshot is empty.
    ptr: Cell<*const T>,
    /// Live guards anchored on this slot.
    ref_count: Cell<u64>,
    /// When set, the outermost guard's drop clears the cached snapshot.
    release_scheduled: Cell<bool>,
    /// Pins the value `ptr` points into.
    retained: Cell<Option<Arc<T>>>,
}

// SAFETY: a slot is only ever created and accessed by its owning thread;
// `Send` is required because the arena that owns all slots is dropped with
// the cell, possibly from another thread, at a point where no guards are
// live (guards borrow the cell). The payload behind `retained`/`ptr` is
// `Send + Sync`.
unsafe impl<T: Send + Sync> Send for CacheSlot<T> {}

impl<T> CacheSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            init: Cell::new(false),
            version: Cell::new(0),
            ptr: Cell::new(ptr::null()),
            ref_count: Cell::new(0),
            release_scheduled: Cell::new(false),
            retained: Cell::new(None),
        }
    }

    #[inline]
    pub(crate) fn raw_ptr(&self) -> *const T {
        self.ptr.get()
    }

    #[inline]
    pub(crate) fn ref_count(&self) -> u64 {
        self.ref_count.get()
    }

    /// Increment the guard count, reporting the pre-increment value.
    #[inline]
    pub(crate) fn acquire(&self) -> u64 {
        let count = self.ref_count.get();
        self.ref_count.set(count + 1);
        count
    }

    /// Decrement the guard count; on the outermost release honor a
    /// scheduled slot clear.
    ///
    /// The clear steps the mirror version back by one (wrapping) so the
    /// next read cannot match the source version and is forced into a
    /// full reconcile, then drops the retained handle. This is the one
    /// place a version moves backwards, and it only touches this
    /// thread's mirror, never the source.
    pub(crate) fn release(&self) {
        let count = self.ref_count.get() - 1;
        self.ref_count.set(count);
        if count > 0 {
            return;
        }

        if !self.release_scheduled.get() {
            return;
        }

        self.version.set(self.version.get().wrapping_sub(1));
        self.ptr.set(ptr::null());
        self.retained.set(None);
        self.release_scheduled.set(false);
    }

    #[inline]
    pub(crate) fn release_flag(&self) -> &Cell<bool> {
        &self.release_scheduled
    }

    fn install(&self, version: u64, value: Option<Arc<T>>) {
        self.version.set(version);
        self.ptr
            .set(value.as_deref().map_or(ptr::null(), |v| v as *const T));
        self.retained.set(value);
    }
}

impl<T: Send + Sync + 'static> CacheSlot<T> {
    /// Bring the slot up to date with the source.
    ///
    /// Called only on the 0 -> 1 guard transition. First touch installs
    /// whatever the source currently holds; afterwards the slot asks only
    /// for versions newer than its mirror, and on a change the displaced
    /// handle goes to the reclaimer when one is attached so the reader
    /// never runs `T`'s destructor on its own thread.
    pub(crate) fn reconcile(&self, source: &Source<T>, reclaimer: Option<&Reclaimer>) {
        if !self.init.get() {
            let (version, value) = source.load_current();
            self.install(version, value);
            self.init.set(true);
            return;
        }

        let seen = self.version.get();
        let (version, value) = source.load_if_newer(seen);
        if version == seen {
            return;
        }

        let previous = self.retained.take();
        self.install(version, value);
        match reclaimer {
            Some(reclaimer) => reclaimer.push(previous),
            None => drop(previous),
        }
    }
}

/// Bridges a cell's source to the calling thread's cache slot.
pub(crate) struct Local<T: Send + Sync> {
    slots: ThreadLocal<CacheSlot<T>>,
    reclaimer: Option<Arc<Reclaimer>>,
}

impl<T: Send + Sync + 'static> Local<T> {
    pub(crate) fn new(reclaimer: Option<Arc<Reclaimer>>) -> Self {
        Self {
            slots: ThreadLocal::new(),
            reclaimer,
        }
    }

    /// Resolve the calling thread's snapshot of `source` into a guard.
    pub(crate) fn read<'a>(&'a self, source: &Source<T>) -> Guard<'a, T> {
        let slot = self.slots.get_or(CacheSlot::new);
        Guard::enter(slot, source, self.reclaimer.as_deref())
    }

    /// Same as [`read`](Self::read), additionally requesting that the
    /// outermost guard's drop evict this thread's cached snapshot.
    pub(crate) fn read_and_schedule_release<'a>(&'a self, source: &Source<T>) -> Guard<'a, T> {
        let guard = self.read(source);
        guard.tls().schedule_release();
        guard
    }
}
