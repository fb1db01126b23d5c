//! JSON-file watermark store.
//!
//! Layout on disk:
//!
//! ```json
//! {"https://example.com/feed.rss": {"last_seen_at": "2024-01-15T12:00:00+00:00"}}
//! ```
//!
//! Every operation reads the whole file and `set` rewrites the whole file,
//! under a lock scoped to the store instance. There is no cross-process
//! locking: two processes writing the same file can lose updates.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{WatermarkStore, LAST_SEEN_FIELD};
use crate::error::{Error, Result};
use crate::timestamp::{parse_iso8601, to_iso8601};

/// Path used when the caller does not pick one.
pub const DEFAULT_PATH: &str = "scoutrss.data.json";

/// One feed's record. Fields we don't know about are carried through
/// rewrites untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_seen_at: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, creating it as `{}` if it does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(b"{}")?;
                debug!(path = %path.display(), "Created watermark file");
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Open the store at [`DEFAULT_PATH`] in the working directory.
    pub fn open_default() -> Result<Self> {
        Self::new(DEFAULT_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>> {
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text)? {
            Value::Object(map) => Ok(map),
            other => Err(self.corrupt(format!("expected a JSON object, found {}", kind(&other)))),
        }
    }

    fn write(&self, data: &Map<String, Value>) -> Result<()> {
        fs::write(&self.path, serde_json::to_vec(data)?)?;
        Ok(())
    }

    fn record(&self, id: &str, value: Option<Value>) -> Result<Record> {
        match value {
            None | Some(Value::Null) => Ok(Record::default()),
            Some(value @ Value::Object(_)) => Ok(serde_json::from_value(value)?),
            Some(other) => Err(self.corrupt(format!(
                "record for {id:?} should be an object, found {}",
                kind(&other)
            ))),
        }
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::CorruptStore {
            path: self.path.clone(),
            reason,
        }
    }
}

impl WatermarkStore for FileStore {
    fn get_last_seen(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.lock.lock();
        let mut data = self.read()?;
        let record = self.record(id, data.remove(id))?;
        record.last_seen_at.as_deref().map(parse_iso8601).transpose()
    }

    fn set_last_seen(&self, id: &str, last_seen: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock();
        let mut data = self.read()?;
        let mut record = self.record(id, data.remove(id))?;
        record.last_seen_at = Some(to_iso8601(last_seen));
        data.insert(id.to_string(), serde_json::to_value(record)?);
        self.write(&data)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
