//! Crate-wide error type.
//!
//! Storage and transport failures are surfaced through [`Error`]; handler
//! failures never are (they are logged by the watcher and recovered).

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction arguments or a missing collaborator.
    #[error("Config Error - {0}")]
    Config(String),

    #[error("I/O Error - {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Error - {0}")]
    Json(#[from] serde_json::Error),

    /// The store file parsed as JSON but does not have the expected shape.
    #[error("Corrupt store {} - {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Invalid timestamp - {0}")]
    InvalidTimestamp(String),

    /// The document collection backing a [`crate::store::DocumentStore`]
    /// failed or is unreachable.
    #[error("Collection Error - {0}")]
    Collection(String),

    #[error("HTTP Error - {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed Error - {0}")]
    Feed(#[from] rss::Error),

    /// The document was not RSS and did not parse as Atom either.
    #[error("Atom Feed Error - {0}")]
    Atom(#[from] atom_syndication::Error),

    #[error("Scheduler Error - {0}")]
    Scheduler(String),
}
