//! `Mirror<T>` — the public snapshot cell.

use std::fmt;
use std::sync::Arc;

use crate::guard::Guard;
use crate::reclaim::Reclaimer;
use crate::slot::Local;
use crate::source::Source;

/// A read-mostly cell holding one versioned, immutable value.
///
/// Readers call [`load`](Mirror::load) and get a [`Guard`] pinning a
/// stable snapshot for its scope; writers call [`update`](Mirror::update)
/// with a replacement handle. The cell may hold "empty" (`None`), which
/// loads as an empty guard rather than anything undefined.
///
/// With a [`Reclaimer`] attached, superseded values are destroyed on the
/// reclaimer's worker thread instead of whichever reader or writer
/// happens to drop the last handle.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ayna::Mirror;
///
/// let config = Mirror::from_value(8080u16);
/// assert_eq!(*config.load(), 8080);
///
/// config.update(Some(Arc::new(9090)));
/// assert_eq!(*config.load(), 9090);
/// ```
pub struct Mirror<T: Send + Sync> {
    source: Source<T>,
    local: Local<T>,
}

impl<T: Send + Sync + 'static> Mirror<T> {
    /// Create a cell from an initial handle, possibly empty.
    pub fn new(initial: Option<Arc<T>>) -> Self {
        Self::build(initial, None)
    }

    /// Create a cell wired to a shared reclaimer.
    ///
    /// Every value this cell supersedes, on publish and on reader-side
    /// version refresh alike, is routed to `reclaimer` instead of being
    /// dropped in place.
    pub fn with_reclaimer(initial: Option<Arc<T>>, reclaimer: Arc<Reclaimer>) -> Self {
        Self::build(initial, Some(reclaimer))
    }

    /// Create a cell holding `value`.
    pub fn from_value(value: T) -> Self {
        Self::new(Some(Arc::new(value)))
    }

    /// Create an empty cell.
    pub fn empty() -> Self {
        Self::new(None)
    }

    fn build(initial: Option<Arc<T>>, reclaimer: Option<Arc<Reclaimer>>) -> Self {
        Self {
            source: Source::new(initial, reclaimer.clone()),
            local: Local::new(reclaimer),
        }
    }

    /// Publish a replacement value, superseding the current one.
    pub fn update(&self, value: Option<Arc<T>>) {
        self.source.publish(value);
    }

    /// Synonym for [`update`](Mirror::update).
    #[inline]
    pub fn assign(&self, value: Option<Arc<T>>) {
        self.update(value);
    }

    /// Pin this thread's snapshot of the cell for the guard's scope.
    ///
    /// The first guard in a scope reconciles against the source; guards
    /// nested under it reuse the same snapshot regardless of concurrent
    /// publishes.
    pub fn load(&self) -> Guard<'_, T> {
        self.local.read(&self.source)
    }

    /// Like [`load`](Mirror::load), but additionally schedule the
    /// thread's cache slot for eviction when the outermost guard drops.
    ///
    /// Cache slots otherwise live as long as the cell, so a transient
    /// thread that read a large value once would pin it until the cell is
    /// dropped. Loading through this method releases the slot's retained
    /// handle at the end of the scope and forces the thread's next read
    /// to reconcile from scratch.
    pub fn load_with_tls_release(&self) -> Guard<'_, T> {
        self.local.read_and_schedule_release(&self.source)
    }

    /// The cell's current publish count.
    #[inline]
    pub fn version(&self) -> u64 {
        self.source.version()
    }
}

impl<T: Send + Sync + 'static> Default for Mirror<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Send + Sync + 'static> From<T> for Mirror<T> {
    fn from(value: T) -> Self {
        Self::from_value(value)
    }
}

impl<T: Send + Sync + 'static> From<Arc<T>> for Mirror<T> {
    fn from(handle: Arc<T>) -> Self {
        Self::new(Some(handle))
    }
}

impl<T: Send + Sync + 'static + fmt::Debug> fmt::Debug for Mirror<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (version, value) = self.source.load_current();
        f.debug_struct("Mirror")
            .field("version", &version)
            .field("value", &value)
            .finish()
    }
}
