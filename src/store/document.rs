//! Watermark store backed by a document collection.
//!
//! The collection itself is abstracted behind [`DocumentCollection`] so the
//! store can sit on whatever document database the caller already runs. One
//! document per feed, addressed by the feed id:
//!
//! ```json
//! {"_id": "https://example.com/feed.rss", "last_seen_at": {"$date": "2024-01-15T12:00:00+00:00"}}
//! ```
//!
//! Timestamps are written in the extended-JSON `$date` form so a BSON backend
//! stores them as native dates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{WatermarkStore, LAST_SEEN_FIELD};
use crate::error::{Error, Result};
use crate::timestamp::{parse_iso8601, to_iso8601};

pub type Document = Map<String, Value>;

/// A keyed document collection.
///
/// Implementations are expected to give point-in-time consistency per id.
pub trait DocumentCollection: Send + Sync {
    /// Fetch the document whose id is `id`.
    fn find_one(&self, id: &str) -> Result<Option<Document>>;

    /// Set `fields` on the document `id`, creating it if absent. Fields not
    /// named in `fields` are left alone.
    fn upsert(&self, id: &str, fields: Document) -> Result<()>;
}

#[derive(Debug)]
pub struct DocumentStore<C> {
    collection: C,
    field: String,
}

impl<C: DocumentCollection> DocumentStore<C> {
    pub fn new(collection: C) -> Self {
        Self::with_field(collection, LAST_SEEN_FIELD)
    }

    /// Store the watermark under a field other than `last_seen_at`.
    pub fn with_field(collection: C, field: impl Into<String>) -> Self {
        Self {
            collection,
            field: field.into(),
        }
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }
}

impl<C: DocumentCollection> WatermarkStore for DocumentStore<C> {
    fn get_last_seen(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(document) = self.collection.find_one(id)? else {
            return Ok(None);
        };
        match document.get(&self.field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decode_timestamp(value).map(Some),
        }
    }

    fn set_last_seen(&self, id: &str, last_seen: DateTime<Utc>) -> Result<()> {
        let mut fields = Document::new();
        fields.insert(self.field.clone(), encode_timestamp(last_seen));
        self.collection.upsert(id, fields)
    }
}

pub(super) fn encode_timestamp(at: DateTime<Utc>) -> Value {
    let mut date = Map::new();
    date.insert("$date".to_string(), Value::String(to_iso8601(at)));
    Value::Object(date)
}

/// Accepts an RFC 3339 string, epoch milliseconds, or an extended-JSON
/// `{"$date": ...}` wrapper around either (including `{"$numberLong": ...}`).
pub(super) fn decode_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_iso8601(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| Error::InvalidTimestamp(n.to_string())),
        Value::Object(map) => match map.get("$date") {
            Some(inner @ (Value::String(_) | Value::Number(_))) => decode_timestamp(inner),
            Some(Value::Object(long)) => match long.get("$numberLong") {
                Some(Value::String(millis)) => millis
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::from_timestamp_millis)
                    .ok_or_else(|| Error::InvalidTimestamp(value.to_string())),
                _ => Err(Error::InvalidTimestamp(value.to_string())),
            },
            _ => Err(Error::InvalidTimestamp(value.to_string())),
        },
        other => Err(Error::InvalidTimestamp(other.to_string())),
    }
}

/// An in-process [`DocumentCollection`].
///
/// Mostly useful for tests, and as the reference for what a real collection
/// adapter has to do.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole document.
    pub fn insert(&self, id: &str, document: Document) {
        self.documents.write().insert(id.to_string(), document);
    }
}

impl DocumentCollection for MemoryCollection {
    fn find_one(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().get(id).cloned())
    }

    fn upsert(&self, id: &str, fields: Document) -> Result<()> {
        let mut documents = self.documents.write();
        let document = documents.entry(id.to_string()).or_insert_with(|| {
            let mut doc = Document::new();
            doc.insert("_id".to_string(), Value::String(id.to_string()));
            doc
        });
        document.extend(fields);
        Ok(())
    }
}

impl<C: DocumentCollection + ?Sized> DocumentCollection for std::sync::Arc<C> {
    fn find_one(&self, id: &str) -> Result<Option<Document>> {
        (**self).find_one(id)
    }

    fn upsert(&self, id: &str, fields: Document) -> Result<()> {
        (**self).upsert(id, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn dt() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn dt2() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 20, 8, 30, 0).unwrap()
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    /// A collection whose backend is always down.
    struct Unreachable;

    impl DocumentCollection for Unreachable {
        fn find_one(&self, _id: &str) -> Result<Option<Document>> {
            Err(Error::Collection("connection refused".into()))
        }

        fn upsert(&self, _id: &str, _fields: Document) -> Result<()> {
            Err(Error::Collection("connection refused".into()))
        }
    }

    #[test]
    fn missing_document_is_none() {
        let store = DocumentStore::new(MemoryCollection::new());
        assert_eq!(store.get_last_seen("feed1").unwrap(), None);
    }

    #[test]
    fn set_upserts_then_replaces() {
        let store = DocumentStore::new(MemoryCollection::new());
        store.set_last_seen("feed1", dt()).unwrap();
        assert_eq!(store.get_last_seen("feed1").unwrap(), Some(dt()));
        store.set_last_seen("feed1", dt2()).unwrap();
        assert_eq!(store.get_last_seen("feed1").unwrap(), Some(dt2()));

        let stored = store.collection().find_one("feed1").unwrap().unwrap();
        assert_eq!(stored["_id"], json!("feed1"));
        assert_eq!(
            stored[LAST_SEEN_FIELD],
            json!({"$date": "2024-02-20T08:30:00+00:00"})
        );
    }

    #[test]
    fn set_keeps_unrelated_fields() {
        let collection = MemoryCollection::new();
        collection.insert("feed1", doc(json!({"_id": "feed1", "owner": "ops"})));
        let store = DocumentStore::new(collection);

        store.set_last_seen("feed1", dt()).unwrap();

        let stored = store.collection().find_one("feed1").unwrap().unwrap();
        assert_eq!(stored["owner"], json!("ops"));
    }

    #[test]
    fn ids_are_independent() {
        let store = DocumentStore::new(MemoryCollection::new());
        store.set_last_seen("feed1", dt()).unwrap();
        store.set_last_seen("feed2", dt2()).unwrap();
        assert_eq!(store.get_last_seen("feed1").unwrap(), Some(dt()));
        assert_eq!(store.get_last_seen("feed2").unwrap(), Some(dt2()));
    }

    #[test]
    fn decodes_native_date_shapes() {
        let collection = MemoryCollection::new();
        collection.insert("millis", doc(json!({"last_seen_at": 1705320000000_i64})));
        collection.insert(
            "extended",
            doc(json!({"last_seen_at": {"$date": "2024-01-15T12:00:00Z"}})),
        );
        collection.insert(
            "extended-millis",
            doc(json!({"last_seen_at": {"$date": 1705320000000_i64}})),
        );
        collection.insert(
            "extended-long",
            doc(json!({"last_seen_at": {"$date": {"$numberLong": "1705320000000"}}})),
        );
        collection.insert("string", doc(json!({"last_seen_at": "2024-01-15T12:00:00+00:00"})));
        collection.insert("null", doc(json!({"last_seen_at": null})));
        collection.insert("bogus", doc(json!({"last_seen_at": true})));
        let store = DocumentStore::new(collection);

        assert_eq!(store.get_last_seen("millis").unwrap(), Some(dt()));
        assert_eq!(store.get_last_seen("extended").unwrap(), Some(dt()));
        assert_eq!(store.get_last_seen("extended-millis").unwrap(), Some(dt()));
        assert_eq!(store.get_last_seen("extended-long").unwrap(), Some(dt()));
        assert_eq!(store.get_last_seen("string").unwrap(), Some(dt()));
        assert_eq!(store.get_last_seen("null").unwrap(), None);
        assert!(matches!(
            store.get_last_seen("bogus"),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn custom_field_name() {
        let store = DocumentStore::with_field(MemoryCollection::new(), "watermark");
        store.set_last_seen("feed1", dt()).unwrap();
        let stored = store.collection().find_one("feed1").unwrap().unwrap();
        assert!(stored.contains_key("watermark"));
        assert!(!stored.contains_key(LAST_SEEN_FIELD));
        assert_eq!(store.get_last_seen("feed1").unwrap(), Some(dt()));
    }

    #[test]
    fn shared_collection_through_arc() {
        let collection = Arc::new(MemoryCollection::new());
        let a = DocumentStore::new(Arc::clone(&collection));
        let b = DocumentStore::new(Arc::clone(&collection));
        a.set_last_seen("feed1", dt()).unwrap();
        assert_eq!(b.get_last_seen("feed1").unwrap(), Some(dt()));
    }

    #[test]
    fn backend_errors_propagate() {
        let store = DocumentStore::new(Unreachable);
        assert!(matches!(
            store.get_last_seen("feed1"),
            Err(Error::Collection(_))
        ));
        assert!(matches!(
            store.set_last_seen("feed1", dt()),
            Err(Error::Collection(_))
        ));
    }
}
