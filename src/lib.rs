//! Ayna: versioned snapshot cells for read-mostly shared state.
//!
//! A [`Mirror<T>`] holds one immutable value behind a monotonically
//! versioned publication cell. Readers take a stable snapshot through a
//! per-thread cache for the cost of two atomic loads on the hot path;
//! writers replace the whole value atomically and never wait for readers
//! to drain. The design targets state that is rebuilt in bulk and swapped
//! wholesale (routing tables, configuration, feature sets) where reads
//! outnumber writes by orders of magnitude.
//!
//! # Key Properties
//!
//! - **Near-free reads**: a repeat read on an unchanged cell is a version
//!   compare against a thread-local mirror, nothing more
//! - **Snapshot isolation**: every read inside a guard's scope on the same
//!   thread sees the same version, no matter how many publishes land
//! - **Non-blocking writers**: publishes serialize against each other on a
//!   short spinlock and never block on readers
//! - **Off-path destruction**: an optional [`Reclaimer`] runs superseded
//!   values' destructors on its own worker thread
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ayna::Mirror;
//!
//! // A cell holding a routing table that is rebuilt in bulk.
//! let routes = Mirror::from_value(vec!["10.0.0.0/8", "192.168.0.0/16"]);
//!
//! {
//!     let snap = routes.load();
//!     assert_eq!(snap.len(), 2);
//!
//!     // A publish does not disturb the held snapshot...
//!     routes.update(Some(Arc::new(vec!["0.0.0.0/0"])));
//!     assert_eq!(snap.len(), 2);
//!
//!     // ...and neither does a nested read in the same scope.
//!     assert_eq!(routes.load().len(), 2);
//! }
//!
//! // A fresh scope observes the new version.
//! assert_eq!(routes.load().len(), 1);
//! ```

#![warn(missing_docs)]

mod bundle;
mod guard;
mod mirror;
mod reclaim;
mod slot;
mod source;
mod spin;

pub use bundle::{Bundle, GuardPack, PackIndex};
pub use guard::{Guard, TlsControl};
pub use mirror::Mirror;
pub use reclaim::Reclaimer;
pub use source::Source;
