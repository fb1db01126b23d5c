//! Watermark persistence.
//!
//! A watermark is the publication time of the last entry delivered for a
//! feed. [`WatermarkStore`] is the seam; pick an implementation and hand it
//! to the watcher:
//!
//! * [`MemoryStore`] — process-local, lost on exit. Handy for tests.
//! * [`FileStore`] — a JSON file, durable, single process only.
//! * [`DocumentStore`] — any keyed document collection, durable and usable
//!   from several processes. With the `mongodb` feature, `MongoCollection`
//!   plugs a MongoDB collection in.
//!
//! One store may back many watchers as long as their feed ids differ;
//! operations on one id never touch another id's data.

mod document;
mod file;
mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

pub use document::{Document, DocumentCollection, DocumentStore, MemoryCollection};
pub use file::{FileStore, DEFAULT_PATH};
pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoCollection;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Name of the field holding the watermark in file records and documents.
pub const LAST_SEEN_FIELD: &str = "last_seen_at";

/// Persists the last-seen timestamp per feed id.
///
/// Implementations must give read-after-write consistency per id: a `get`
/// that follows a successful `set` observes it.
pub trait WatermarkStore: Send + Sync {
    /// The stored watermark for `id`, or `None` if nothing was ever stored.
    fn get_last_seen(&self, id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Replace the watermark for `id`.
    fn set_last_seen(&self, id: &str, last_seen: DateTime<Utc>) -> Result<()>;
}
