//! Feed source abstraction layer.
//!
//! This module defines the [`FeedSource`] trait and the common [`FeedEntry`]
//! type. The shipped implementation is [`RssSource`]; tests and callers with
//! exotic transports can supply their own.
//!
//! ## Adding a new source
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct and implement [`FeedSource`] for it.
//! 3. Add `mod atom;` below and re-export your struct.
//! 4. Hand it to [`WatcherBuilder::source`](crate::WatcherBuilder::source).

mod entry;
mod rss;

pub use entry::FeedEntry;
pub use rss::RssSource;

use crate::error::Result;

/// Fetches and parses a feed into entries.
///
/// The watcher calls [`fetch()`](FeedSource::fetch) once per check, possibly
/// from a scheduler thread, so implementations must be [`Send`] + [`Sync`].
///
/// ```ignore
/// struct StaticSource(Vec<FeedEntry>);
///
/// impl FeedSource for StaticSource {
///     fn fetch(&self, _url: &str) -> Result<Vec<FeedEntry>> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait FeedSource: Send + Sync {
    /// Fetch the feed at `url`.
    ///
    /// Entries may come back in any order. Transport and parse failures are
    /// returned as errors; the watcher does not retry them.
    fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>>;
}
