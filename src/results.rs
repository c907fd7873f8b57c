//! Typed results of write and administration commands.

use crate::error::bson_to_i64;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Result of an insert_one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// The ID of the inserted document.
    pub inserted_id: Bson,
}

/// Result of an insert_many operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// IDs of the inserted documents, in input order.
    pub inserted_ids: Vec<Bson>,
}

/// Result of an update or replace operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Number of documents matched.
    pub matched_count: u64,
    /// Number of documents modified.
    pub modified_count: u64,
    /// The ID of the upserted document, if any.
    pub upserted_id: Option<Bson>,
}

impl UpdateResult {
    /// Read an `update` command reply.
    ///
    /// The server counts an upsert in `n`; it is not a match.
    pub(crate) fn from_reply(reply: &Document) -> Self {
        let n = reply.get("n").and_then(bson_to_i64).unwrap_or(0) as u64;
        let upserted_id = reply
            .get_array("upserted")
            .ok()
            .and_then(|upserted| upserted.first())
            .and_then(Bson::as_document)
            .and_then(|entry| entry.get("_id"))
            .cloned();
        let matched_count = if upserted_id.is_some() {
            n.saturating_sub(1)
        } else {
            n
        };

        Self {
            matched_count,
            modified_count: reply.get("nModified").and_then(bson_to_i64).unwrap_or(0) as u64,
            upserted_id,
        }
    }
}

/// Result of a delete operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    /// Number of documents deleted.
    pub deleted_count: u64,
}

impl DeleteResult {
    pub(crate) fn from_reply(reply: &Document) -> Self {
        Self {
            deleted_count: reply.get("n").and_then(bson_to_i64).unwrap_or(0) as u64,
        }
    }
}

/// Result of creating one index.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexResult {
    /// Name of the index.
    pub index_name: String,
}

/// Result of creating several indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexesResult {
    /// Names of the indexes, in request order.
    pub index_names: Vec<String>,
}

/// Kind of namespace returned by `listCollections`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionType {
    /// A regular collection.
    Collection,
    /// A view.
    View,
    /// A time-series collection.
    Timeseries,
}

/// Server-side information about a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpecificationInfo {
    /// Whether the collection is read-only.
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
    /// Collection UUID.
    #[serde(default)]
    pub uuid: Option<bson::Binary>,
}

/// One entry of `listCollections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpecification {
    /// Collection name.
    pub name: String,
    /// Collection kind.
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    /// Options the collection was created with.
    #[serde(default)]
    pub options: Document,
    /// Extra information.
    pub info: CollectionSpecificationInfo,
    /// Definition of the `_id` index.
    #[serde(rename = "idIndex", default)]
    pub id_index: Option<Document>,
}
