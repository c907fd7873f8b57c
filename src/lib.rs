//! # mongo-async
//!
//! Async MongoDB client core.
//!
//! This crate builds every server command itself (CRUD, aggregation, index
//! and collection administration, transactions, GridFS) and hands the
//! finished command documents to a [`Transport`]. The production transport
//! is backed by the official `mongodb` driver, which owns pooling,
//! authentication, TLS and server selection.
//!
//! ## Features
//!
//! - Typed collections over serde
//! - Lazy cursors with `getMore` batching and tailable support
//! - Sessions with causal consistency and multi-document transactions
//! - Read/write concern and read preference inheritance
//! - GridFS buckets
//! - A scripted transport for offline tests
//!
//! ## Quick Start
//!
//! ```ignore
//! use mongo_async::{Client, bson::doc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> mongo_async::Result<()> {
//!     let client = Client::connect("mongodb://localhost/mydb").await?;
//!
//!     // Get a database and collection
//!     let db = client.default_database()?;
//!     let users = db.collection::<User>("users");
//!
//!     // Insert a document
//!     users.insert_one(User {
//!         name: "John".to_string(),
//!         email: "john@example.com".to_string(),
//!     }, None).await?;
//!
//!     // Find documents
//!     let results: Vec<User> = users.find_many(doc! { "name": "John" }, None).await?;
//!
//!     // Update a document
//!     users.update_one(
//!         doc! { "email": "john@example.com" },
//!         doc! { "$set": { "name": "Jane" } },
//!         None,
//!     ).await?;
//!
//!     // Delete a document
//!     users.delete_one(doc! { "email": "john@example.com" }, None).await?;
//!
//!     client.close(false).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod gridfs;
pub mod index;
pub mod options;
pub mod results;
pub mod session;
pub mod transport;

// Re-export main types
pub use client::{Client, ClientOptions, ClientOptionsBuilder};
pub use codec::{Codec, CodecOptions, CodecOptionsBuilder, KeyCase};
pub use collection::{Collection, UpdateModifications};
pub use config::{ConnectionString, HostAddress, Scheme};
pub use cursor::Cursor;
pub use db::{
    ClusteredIndex, CreateCollectionOptions, CreateCollectionOptionsBuilder, Database,
    TimeseriesOptions, ValidationAction, ValidationLevel,
};
pub use error::{ErrorKind, MongoError, Result, WriteConcernFailure, WriteFailure};
pub use gridfs::{
    GridFsBucket, GridFsBucketOptions, GridFsBucketOptionsBuilder, GridFsFile, GridFsPutOptions,
    GridFsPutResult,
};
pub use index::{IndexDirection, IndexKeys, IndexModel, IndexOptions};
pub use options::{
    Acknowledgment, AggregateOptions, Collation, CollectionOptions, CountOptions,
    CreateIndexOptions, CursorType, DatabaseOptions, DeleteOptions, DistinctOptions,
    DropIndexOptions, DropOptions, EstimatedDocumentCountOptions, FindOneAndDeleteOptions,
    FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
    FindOptionsBuilder, Hint, InsertManyOptions, InsertOneOptions, ListCollectionsOptions,
    ReadConcern, ReadConcernLevel, ReadPreference, ReadPreferenceMode, ReplaceOptions,
    ReturnDocument, SessionOptions, TransactionOptions, TransactionOptionsBuilder, UpdateOptions,
    UpdateOptionsBuilder, WriteConcern,
};
pub use results::{
    CollectionSpecification, CollectionSpecificationInfo, CollectionType, CreateIndexResult,
    CreateIndexesResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult,
};
pub use session::{ClientSession, SessionPhase};
pub use transport::{DriverTransport, RecordedCommand, ScriptedTransport, ServerSession, Transport};

// Re-export bson for convenience
pub use bson;
pub use bson::doc;

/// Prelude module for common imports.
pub mod prelude {
    pub use super::client::{Client, ClientOptions};
    pub use super::collection::Collection;
    pub use super::cursor::Cursor;
    pub use super::db::Database;
    pub use super::error::{ErrorKind, MongoError, Result};
    pub use super::options::{FindOptions, UpdateOptions};
    pub use super::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
    pub use super::session::ClientSession;
    pub use bson::{doc, Document};
    pub use futures::StreamExt;
    pub use serde::{Deserialize, Serialize};
}

/// Get the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }

    #[test]
    fn test_doc_macro() {
        let document = doc! {
            "name": "John",
            "age": 30,
            "active": true,
        };
        assert_eq!(document.get_str("name").unwrap(), "John");
        assert_eq!(document.get_i32("age").unwrap(), 30);
        assert!(document.get_bool("active").unwrap());
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _: Result<()> = Ok(());
        let _doc = doc! { "test": 1 };
    }

    #[test]
    fn test_error_kind_variants() {
        let _ = ErrorKind::Connection;
        let _ = ErrorKind::ServerSelection;
        let _ = ErrorKind::OperationFailure;
        let _ = ErrorKind::DuplicateKey;
        let _ = ErrorKind::Write;
        let _ = ErrorKind::WriteConcern;
        let _ = ErrorKind::IndexConflict;
        let _ = ErrorKind::Serialization;
        let _ = ErrorKind::NoFile;
        let _ = ErrorKind::FileExists;
        let _ = ErrorKind::GridFs;
        let _ = ErrorKind::Internal;
    }
}
