//! [`DocumentCollection`] over a MongoDB collection.
//!
//! Documents are addressed by `_id`; writes are `update_one` with `$set` and
//! `upsert(true)`, so fields written by other tools survive. Timestamps
//! arrive from [`super::DocumentStore`] in extended-JSON `$date` form and are
//! stored as native BSON dates (millisecond precision).

use mongodb::bson::{doc, Bson, Document as BsonDocument};
use mongodb::sync::{Client, Collection};
use serde_json::Value;
use tracing::debug;

use super::document::{Document, DocumentCollection};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct MongoCollection {
    collection: Collection<BsonDocument>,
}

impl MongoCollection {
    pub fn new(collection: Collection<BsonDocument>) -> Self {
        Self { collection }
    }

    /// Connect to `uri` and use `database.collection`.
    pub fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).map_err(collection_error)?;
        debug!(database, collection, "Connected to MongoDB");
        Ok(Self::new(client.database(database).collection(collection)))
    }

    pub fn inner(&self) -> &Collection<BsonDocument> {
        &self.collection
    }
}

impl DocumentCollection for MongoCollection {
    fn find_one(&self, id: &str) -> Result<Option<Document>> {
        self.collection
            .find_one(doc! { "_id": id })
            .run()
            .map_err(collection_error)?
            .map(from_bson)
            .transpose()
    }

    fn upsert(&self, id: &str, fields: Document) -> Result<()> {
        let fields = to_bson(fields)?;
        self.collection
            .update_one(doc! { "_id": id }, doc! { "$set": fields })
            .upsert(true)
            .run()
            .map_err(collection_error)?;
        Ok(())
    }
}

fn collection_error(e: mongodb::error::Error) -> Error {
    Error::Collection(e.to_string())
}

fn from_bson(document: BsonDocument) -> Result<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(Error::Collection(format!("not a document: {other}"))),
    }
}

fn to_bson(fields: Document) -> Result<BsonDocument> {
    match Bson::try_from(Value::Object(fields)) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(Error::Collection(format!("not a document: {other}"))),
        Err(e) => Err(Error::Collection(e.to_string())),
    }
}
