use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::WatermarkStore;
use crate::error::Result;

/// Keeps watermarks in a map; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryStore {
    fn get_last_seen(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.data.read().get(id).copied())
    }

    fn set_last_seen(&self, id: &str, last_seen: DateTime<Utc>) -> Result<()> {
        self.data.write().insert(id.to_string(), last_seen);
        Ok(())
    }
}
