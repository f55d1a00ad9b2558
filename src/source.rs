//! The authoritative (value, version) pair behind each cell.
//!
//! Publishes serialize on a short TTAS lock and bump a monotonic 64-bit
//! version; both read paths are two independent acquire loads and never
//! take the lock.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwapOption;
use portable_atomic::AtomicU64;

use crate::reclaim::Reclaimer;
use crate::spin::SpinLock;

/// Versioned publication point for one cell.
///
/// Holds the current value handle and the version counter that readers
/// reconcile their thread-local mirrors against. The handle is nullable:
/// a cell may legitimately hold "empty".
///
/// The version/handle pair is *not* read transactionally. A reader racing
/// a publish may observe a version newer than the handle it then loads,
/// or vice versa. What readers rely on is that the handle is a shared
/// reference that keeps its value alive once taken, that versions only
/// grow, and that a later reconcile converges, not that the two loads
/// belong to the same publish.
pub struct Source<T> {
    value: ArcSwapOption<T>,
    version: AtomicU64,
    publish_lock: SpinLock,
    reclaimer: Option<Arc<Reclaimer>>,
}

impl<T: Send + Sync + 'static> Source<T> {
    /// Create a source from an initial handle, optionally wired to a
    /// reclaimer that receives every handle this source supersedes.
    pub fn new(initial: Option<Arc<T>>, reclaimer: Option<Arc<Reclaimer>>) -> Self {
        Self {
            value: ArcSwapOption::new(initial),
            version: AtomicU64::new(0),
            publish_lock: SpinLock::new(),
            reclaimer,
        }
    }

    /// Replace the published value and bump the version.
    ///
    /// The displaced handle is routed to the reclaimer when one is
    /// attached, so the caller never pays for `T`'s destructor here;
    /// without a reclaimer it is dropped in place, destroying `T` once
    /// the last reader lets go of it. Either way that work happens after
    /// the lock is released.
    pub fn publish(&self, value: Option<Arc<T>>) {
        let old = {
            let _held = self.publish_lock.lock();
            let old = self.value.swap(value);
            self.version.fetch_add(1, Ordering::Release);
            old
        };

        if let Some(reclaimer) = &self.reclaimer {
            reclaimer.push(old);
        }
    }

    /// Load the current (version, handle) pair.
    ///
    /// Used for the first-ever reconcile of a thread's cache slot.
    pub fn load_current(&self) -> (u64, Option<Arc<T>>) {
        let version = self.version.load(Ordering::Acquire);
        let value = self.value.load_full();
        (version, value)
    }

    /// Load the current pair only if the version has moved past `seen`.
    ///
    /// Returns `(seen, None)` when the caller is already current; the
    /// caller distinguishes that from "newer but empty" by the version,
    /// never by the handle.
    pub fn load_if_newer(&self, seen: u64) -> (u64, Option<Arc<T>>) {
        let version = self.version.load(Ordering::Acquire);
        if version == seen {
            return (seen, None);
        }
        (version, self.value.load_full())
    }

    /// Current version counter value.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
