//! scout-rss — watch an RSS feed and deliver each new entry once.
//!
//! ## Architecture overview
//!
//! ```text
//!              check() every interval
//! ┌─────────────┐ ─────────────────► ┌────────────┐  fetch()  ┌────────────┐
//! │ scheduler/  │                    │ watcher.rs │ ────────► │  source/   │
//! │ (tokio job) │                    │ (diff +    │           │ (rss/http) │
//! └─────────────┘                    │  deliver)  │           └────────────┘
//!                                    └────────────┘
//!                              get/set    │    │ handle(entry)
//!                            last_seen    ▼    ▼
//!                                ┌──────────┐  ┌─────────────┐
//!                                │  store/  │  │   handler   │
//!                                └──────────┘  │ (your code) │
//!                                              └─────────────┘
//! ```
//!
//! * **`source/`** — the [`FeedSource`] trait, the [`FeedEntry`] type and the
//!   RSS implementation.
//! * **`store/`** — the [`WatermarkStore`] trait with memory, JSON file and
//!   document collection implementations (MongoDB behind the `mongodb`
//!   feature).
//! * **`watcher`** — [`Watcher`]: diffing, ordering, delivery and watermark
//!   advancement; `listen`/`stop` for scheduling.
//! * **`scheduler/`** — the [`Scheduler`] trait and, behind the default
//!   `scheduler` feature, [`IntervalScheduler`].

pub mod error;
pub mod scheduler;
pub mod source;
pub mod store;
mod timestamp;
pub mod watcher;

pub use error::{Error, Result};
#[cfg(feature = "scheduler")]
pub use scheduler::IntervalScheduler;
pub use scheduler::{JobFn, JobSpec, Scheduler};
pub use source::{FeedEntry, FeedSource, RssSource};
#[cfg(feature = "mongodb")]
pub use store::MongoCollection;
pub use store::{
    Document, DocumentCollection, DocumentStore, FileStore, MemoryCollection, MemoryStore,
    WatermarkStore,
};
pub use watcher::{EntryHandler, ListenOptions, Watcher, WatcherBuilder};
