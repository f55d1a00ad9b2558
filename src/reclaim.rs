//! Background reclaimer: destroys superseded values off the hot path.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use foldhash::fast::FixedState;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};

/// A retired value handle, type-erased so one reclaimer can serve cells
/// of different payload types.
type RetiredHandle = Arc<dyn Any + Send + Sync>;

/// Retired handles awaiting destruction, keyed by allocation address so a
/// handle pushed twice collapses to one entry.
struct ReclaimQueue {
    retired: HashMap<usize, RetiredHandle, FixedState>,
    notified: bool,
}

struct Shared {
    queue: Mutex<ReclaimQueue>,
    scan_cv: Condvar,
    stop: AtomicBool,
    interval: Duration,
    worker_id: OnceCell<ThreadId>,
}

impl Shared {
    fn run(&self) {
        loop {
            let mut sole_owner: Vec<RetiredHandle> = Vec::new();
            {
                let mut queue = self.queue.lock();
                while !queue.notified && !self.stop.load(Ordering::Acquire) {
                    if self.interval.is_zero() {
                        self.scan_cv.wait(&mut queue);
                    } else if self.scan_cv.wait_for(&mut queue, self.interval).timed_out() {
                        // Periodic scan even without a notification.
                        break;
                    }
                }
                queue.notified = false;

                if self.stop.load(Ordering::Acquire) {
                    // Best-effort drain: anything still shared is
                    // destroyed later by its last holder, never early.
                    queue.retired.clear();
                    return;
                }

                // A count of 1 means this queue holds the only reference
                // left, and nobody else can raise it again; safe to take.
                let sole: Vec<usize> = queue
                    .retired
                    .iter()
                    .filter(|(_, handle)| Arc::strong_count(handle) == 1)
                    .map(|(&key, _)| key)
                    .collect();
                sole_owner.reserve(sole.len());
                for key in sole {
                    if let Some(handle) = queue.retired.remove(&key) {
                        sole_owner.push(handle);
                    }
                }
            }
            // Destructors run here, on the worker, outside the lock.
            drop(sole_owner);
        }
    }
}

/// Background worker that destroys retired values once it is their sole
/// remaining owner.
///
/// Writers and refreshing readers hand superseded handles to the
/// reclaimer; the worker scans its queue periodically (or on push) and
/// drops every handle whose reference count has fallen to one, so `T`'s
/// destructor runs on the worker thread rather than on a hot path.
///
/// The reclaimer is best-effort by design: a handle stays queued across
/// scans for as long as some slot, guard, or user variable still shares
/// it. Values are never destroyed early, at worst late.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use ayna::{Mirror, Reclaimer};
///
/// let reclaimer = Arc::new(Reclaimer::with_options(true, Duration::from_millis(10)));
/// let cell = Mirror::with_reclaimer(Some(Arc::new(1u64)), reclaimer.clone());
///
/// cell.update(Some(Arc::new(2)));
/// // The superseded value is now owned by the reclaimer and will be
/// // dropped on its worker thread within a scan cycle or two.
/// ```
pub struct Reclaimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Default worker cadence between best-effort scans.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

    /// Spawn a reclaimer with the default options: no startup
    /// synchronization, scans every [`DEFAULT_INTERVAL`](Self::DEFAULT_INTERVAL).
    pub fn new() -> Self {
        Self::with_options(false, Self::DEFAULT_INTERVAL)
    }

    /// Spawn a reclaimer.
    ///
    /// With `wait_for_start` the constructor blocks until the worker has
    /// started and recorded its thread identity, so
    /// [`thread_id`](Self::thread_id) is immediately populated. A zero
    /// `reclaim_interval` makes the worker scan only when pushed to,
    /// which can delay reclamation arbitrarily while no new retirements
    /// arrive.
    pub fn with_options(wait_for_start: bool, reclaim_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(ReclaimQueue {
                retired: HashMap::with_hasher(FixedState::default()),
                notified: false,
            }),
            scan_cv: Condvar::new(),
            stop: AtomicBool::new(false),
            interval: reclaim_interval,
            worker_id: OnceCell::new(),
        });

        let worker = thread::spawn({
            let shared = Arc::clone(&shared);
            move || {
                let _ = shared.worker_id.set(thread::current().id());
                shared.run();
            }
        });

        if wait_for_start {
            let _ = shared.worker_id.wait();
        }

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Identity of the worker thread, once it has started.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.shared.worker_id.get().copied()
    }

    /// Hand a superseded handle to the worker. Internal use.
    ///
    /// An empty handle is a no-op; pushing the same allocation twice
    /// collapses to a single queue entry. During shutdown this degrades
    /// to best-effort: an unscanned handle is destroyed by whoever drops
    /// it last.
    pub fn push<T>(&self, handle: Option<Arc<T>>)
    where
        T: Send + Sync + 'static,
    {
        let Some(handle) = handle else {
            return;
        };
        let key = Arc::as_ptr(&handle) as *const () as usize;
        let handle: RetiredHandle = handle;

        {
            let mut queue = self.shared.queue.lock();
            queue.retired.insert(key, handle);
            queue.notified = true;
        }
        self.shared.scan_cv.notify_one();
    }

    /// Number of handles currently queued. Exposed for tests.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().retired.len()
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        {
            // Flip the flag under the lock so a worker that has checked
            // its predicate but not yet parked cannot miss the wakeup.
            let mut queue = self.shared.queue.lock();
            queue.notified = true;
        }
        self.shared.scan_cv.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
