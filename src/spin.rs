//! TTAS (Test-Test-And-Set) publish lock.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// A TTAS mutual-exclusion flag for the publish path.
///
/// Readers never touch this lock; it only serializes writers, whose
/// critical section is two atomic stores.
pub(crate) struct SpinLock {
    acquired: AtomicBool,
}

impl SpinLock {
    pub(crate) const fn new() -> Self {
        Self {
            acquired: AtomicBool::new(false),
        }
    }

    /// Acquire the lock
    #[inline]
    pub(crate) fn lock(&self) -> SpinGuard<'_> {
        loop {
            // Test phase: spin on relaxed load (stays in cache)
            while self.acquired.load(Ordering::Relaxed) {
                spin_loop();
            }
            // Test-and-set phase: attempt to acquire
            if !self.acquired.swap(true, Ordering::Acquire) {
                return SpinGuard { lock: self };
            }
        }
    }
}

/// RAII guard for the TTAS. Releases the lock on drop.
pub(crate) struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.acquired.store(false, Ordering::Release);
    }
}
