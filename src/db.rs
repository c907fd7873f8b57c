//! Database struct for managing collections.

use crate::client::{Client, ClientInner};
use crate::codec::Codec;
use crate::collection::{aggregate_command, Collection};
use crate::cursor::{Cursor, CursorOptions};
use crate::error::{MongoError, Result, NAMESPACE_NOT_FOUND};
use crate::gridfs::{GridFsBucket, GridFsBucketOptions};
use crate::options::{
    AggregateOptions, Collation, CollectionOptions, CommandExt, DatabaseOptions, DropOptions,
    ListCollectionsOptions, ReadConcern, ReadPreference, WriteConcern,
};
use crate::results::CollectionSpecification;
use crate::session::ClientSession;
use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A handle to a MongoDB database.
///
/// # Example
///
/// ```ignore
/// let client = Client::connect("mongodb://localhost").await?;
/// let db = client.database("mydb");
///
/// let collections = db.list_collection_names(None).await?;
/// println!("Collections: {:?}", collections);
/// ```
#[derive(Clone)]
pub struct Database {
    pub(crate) client: Arc<ClientInner>,
    pub(crate) name: String,
    pub(crate) read_concern: Option<ReadConcern>,
    pub(crate) write_concern: Option<WriteConcern>,
    pub(crate) read_preference: Option<ReadPreference>,
    pub(crate) codec: Codec,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("read_concern", &self.read_concern)
            .field("write_concern", &self.write_concern)
            .field("read_preference", &self.read_preference)
            .finish()
    }
}

impl Database {
    /// Create a new database handle.
    pub(crate) fn new(client: Arc<ClientInner>, name: String, options: DatabaseOptions) -> Self {
        let inherited = &client.options;
        let read_concern = options.read_concern.or_else(|| inherited.read_concern.clone());
        let write_concern = options
            .write_concern
            .or_else(|| inherited.write_concern.clone());
        let read_preference = options
            .read_preference
            .or_else(|| inherited.read_preference.clone());
        let codec = options
            .codec_options
            .map(Codec::new)
            .unwrap_or_else(|| client.codec.clone());

        Self {
            client,
            name,
            read_concern,
            write_concern,
            read_preference,
            codec,
        }
    }

    /// Get the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client this database belongs to.
    pub fn client(&self) -> Client {
        Client {
            inner: self.client.clone(),
        }
    }

    /// Effective read concern.
    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.read_concern.as_ref()
    }

    /// Effective write concern.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }

    /// Effective read preference.
    pub fn read_preference(&self) -> Option<&ReadPreference> {
        self.read_preference.as_ref()
    }

    /// Codec used by collections that do not override it.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Get a handle to a collection with a specific type.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use serde::{Serialize, Deserialize};
    ///
    /// #[derive(Debug, Serialize, Deserialize)]
    /// struct User {
    ///     name: String,
    ///     email: String,
    /// }
    ///
    /// let users = db.collection::<User>("users");
    /// ```
    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        Collection::new(self.clone(), name.to_string(), CollectionOptions::default())
    }

    /// Get a collection handle with overrides.
    pub fn collection_with_options<T>(&self, name: &str, options: CollectionOptions) -> Collection<T> {
        Collection::new(self.clone(), name.to_string(), options)
    }

    /// Get a GridFS bucket stored in this database.
    pub fn gridfs_bucket(&self, options: impl Into<Option<GridFsBucketOptions>>) -> GridFsBucket {
        GridFsBucket::new(self.clone(), options.into().unwrap_or_default())
    }

    pub(crate) async fn execute(
        &self,
        command: Document,
        session: Option<&ClientSession>,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document> {
        self.client
            .execute(&self.name, command, session, read_preference)
            .await
    }

    /// Run a command against this database.
    ///
    /// The reply is validated: `ok: 0` becomes an error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let stats = db.run_command(doc! { "collStats": "users" }, None).await?;
    /// ```
    pub async fn run_command(
        &self,
        command: Document,
        read_preference: impl Into<Option<ReadPreference>>,
    ) -> Result<Document> {
        self.run_command_common(command, read_preference.into(), None)
            .await
    }

    /// Run a command under a session.
    pub async fn run_command_with_session(
        &self,
        command: Document,
        read_preference: impl Into<Option<ReadPreference>>,
        session: &ClientSession,
    ) -> Result<Document> {
        self.run_command_common(command, read_preference.into(), Some(session))
            .await
    }

    async fn run_command_common(
        &self,
        command: Document,
        read_preference: Option<ReadPreference>,
        session: Option<&ClientSession>,
    ) -> Result<Document> {
        if command.is_empty() {
            return Err(MongoError::invalid_argument("command document must not be empty"));
        }
        self.execute(command, session, read_preference.as_ref()).await
    }

    /// Create a new collection.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let options = CreateCollectionOptions::builder().capped(true).size(1 << 20).build();
    /// let events = db.create_collection("events", options).await?;
    /// ```
    pub async fn create_collection(
        &self,
        name: &str,
        options: impl Into<Option<CreateCollectionOptions>>,
    ) -> Result<Collection<Document>> {
        self.create_collection_common(name, options.into(), None)
            .await
    }

    /// Create a new collection under a session.
    pub async fn create_collection_with_session(
        &self,
        name: &str,
        options: impl Into<Option<CreateCollectionOptions>>,
        session: &ClientSession,
    ) -> Result<Collection<Document>> {
        self.create_collection_common(name, options.into(), Some(session))
            .await
    }

    async fn create_collection_common(
        &self,
        name: &str,
        options: Option<CreateCollectionOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Collection<Document>> {
        if name.is_empty() {
            return Err(MongoError::invalid_argument("collection name must not be empty"));
        }
        let options = options.unwrap_or_default();
        let mut command = options.to_command(name)?;
        command.put_write_concern(options.write_concern.as_ref().or(self.write_concern.as_ref()));

        debug!(db = %self.name, collection = %name, "creating collection");
        self.execute(command, session, None).await?;
        Ok(self.collection(name))
    }

    /// List collections matching `filter`.
    pub async fn list_collections(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<ListCollectionsOptions>>,
    ) -> Result<Vec<CollectionSpecification>> {
        self.list_collections_cursor(filter.into(), options.into(), false, None)
            .await?
            .collect()
            .await
    }

    /// List collections under a session.
    pub async fn list_collections_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<ListCollectionsOptions>>,
        session: &ClientSession,
    ) -> Result<Vec<CollectionSpecification>> {
        self.list_collections_cursor(filter.into(), options.into(), false, Some(session))
            .await?
            .collect()
            .await
    }

    /// List all collection names in this database.
    ///
    /// # Example
    ///
    /// ```ignore
    /// for name in db.list_collection_names(None).await? {
    ///     println!("Collection: {}", name);
    /// }
    /// ```
    pub async fn list_collection_names(
        &self,
        filter: impl Into<Option<Document>>,
    ) -> Result<Vec<String>> {
        self.list_collection_names_common(filter.into(), None).await
    }

    /// List collection names under a session.
    pub async fn list_collection_names_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        session: &ClientSession,
    ) -> Result<Vec<String>> {
        self.list_collection_names_common(filter.into(), Some(session))
            .await
    }

    async fn list_collection_names_common(
        &self,
        filter: Option<Document>,
        session: Option<&ClientSession>,
    ) -> Result<Vec<String>> {
        let entries: Vec<Document> = self
            .list_collections_cursor(filter, None, true, session)
            .await?
            .collect()
            .await?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.get_str("name").ok())
            .map(str::to_string)
            .collect())
    }

    async fn list_collections_cursor<T>(
        &self,
        filter: Option<Document>,
        options: Option<ListCollectionsOptions>,
        name_only: bool,
        session: Option<&ClientSession>,
    ) -> Result<Cursor<T>> {
        let options = options.unwrap_or_default();
        let mut command = doc! {
            "listCollections": 1,
            "filter": filter.unwrap_or_default(),
        };
        if name_only {
            command.insert("nameOnly", true);
        }
        command.put_opt("authorizedCollections", options.authorized_collections);
        let mut cursor = Document::new();
        cursor.put_opt("batchSize", options.batch_size.map(i64::from));
        command.insert("cursor", cursor);
        command.put_opt("comment", options.comment);

        let session = self.client.cursor_session(session).await?;
        let reply = self.execute(command, Some(&session), None).await?;
        Cursor::from_reply(
            self.client.clone(),
            Some(session),
            &self.name,
            "$cmd.listCollections",
            &reply,
            CursorOptions {
                batch_size: options.batch_size,
                ..Default::default()
            },
            Codec::default(),
        )
    }

    /// Run a database-level aggregation (e.g. `$currentOp`, `$documents`).
    pub async fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor<Document>> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), None)
            .await
    }

    /// Run a database-level aggregation under a session.
    pub async fn aggregate_with_session(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
        session: &ClientSession,
    ) -> Result<Cursor<Document>> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), Some(session))
            .await
    }

    async fn aggregate_common(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Cursor<Document>> {
        let options = options.unwrap_or_default();
        let command = aggregate_command(
            Bson::Int32(1),
            pipeline,
            &options,
            self.read_concern.as_ref(),
            self.write_concern.as_ref(),
        )?;
        let read_preference = options
            .read_preference
            .clone()
            .or_else(|| self.read_preference.clone());

        let session = self.client.cursor_session(session).await?;
        let reply = self
            .execute(command, Some(&session), read_preference.as_ref())
            .await?;
        Cursor::from_reply(
            self.client.clone(),
            Some(session),
            &self.name,
            "$cmd.aggregate",
            &reply,
            CursorOptions {
                batch_size: options.batch_size,
                max_await_time_ms: options.max_await_time_ms,
                read_preference,
                comment: options.comment.clone(),
                ..Default::default()
            },
            self.codec.clone(),
        )
    }

    /// Drop this database.
    pub async fn drop(&self, options: impl Into<Option<DropOptions>>) -> Result<()> {
        self.drop_common(options.into(), None).await
    }

    /// Drop this database under a session.
    pub async fn drop_with_session(
        &self,
        options: impl Into<Option<DropOptions>>,
        session: &ClientSession,
    ) -> Result<()> {
        self.drop_common(options.into(), Some(session)).await
    }

    async fn drop_common(
        &self,
        options: Option<DropOptions>,
        session: Option<&ClientSession>,
    ) -> Result<()> {
        let options = options.unwrap_or_default();
        let mut command = doc! { "dropDatabase": 1 };
        command.put_write_concern(options.write_concern.as_ref().or(self.write_concern.as_ref()));

        debug!(db = %self.name, "dropping database");
        match self.execute(command, session, None).await {
            Err(e) if e.code() == Some(NAMESPACE_NOT_FOUND) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// Get database statistics (`dbStats`).
    pub async fn stats(&self) -> Result<Document> {
        self.execute(doc! { "dbStats": 1 }, None, None).await
    }
}

/// Schema validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// No validation.
    Off,
    /// Validate all inserts and updates.
    Strict,
    /// Validate only documents that already pass.
    Moderate,
}

impl ValidationLevel {
    fn as_str(self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

/// What happens to documents failing validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAction {
    /// Reject the write.
    Error,
    /// Log and accept.
    Warn,
}

impl ValidationAction {
    fn as_str(self) -> &'static str {
        match self {
            ValidationAction::Error => "error",
            ValidationAction::Warn => "warn",
        }
    }
}

/// Time-series collection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesOptions {
    /// Field holding the measurement time.
    pub time_field: String,
    /// Field holding the series metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_field: Option<String>,
    /// `seconds`, `minutes` or `hours`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    /// Maximum time span of one bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_max_span_seconds: Option<i64>,
    /// Bucket start rounding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_rounding_seconds: Option<i64>,
}

/// Clustered collection index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredIndex {
    /// Always `{_id: 1}`.
    pub key: Document,
    /// Always `true`.
    pub unique: bool,
    /// Index name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<i32>,
}

impl Default for ClusteredIndex {
    fn default() -> Self {
        Self {
            key: doc! { "_id": 1 },
            unique: true,
            name: None,
            v: None,
        }
    }
}

/// Options for creating a collection.
#[derive(Debug, Clone, Default)]
pub struct CreateCollectionOptions {
    /// Whether the collection is capped.
    pub capped: Option<bool>,
    /// Maximum size in bytes for capped collections.
    pub size: Option<u64>,
    /// Maximum number of documents for capped collections.
    pub max: Option<u64>,
    /// Storage engine configuration.
    pub storage_engine: Option<Document>,
    /// Validation rules.
    pub validator: Option<Document>,
    /// Validation strictness.
    pub validation_level: Option<ValidationLevel>,
    /// Validation failure handling.
    pub validation_action: Option<ValidationAction>,
    /// Source collection of a view.
    pub view_on: Option<String>,
    /// Pipeline of a view.
    pub pipeline: Option<Vec<Document>>,
    /// Default collation.
    pub collation: Option<Collation>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Defaults for indexes created later.
    pub index_option_defaults: Option<Document>,
    /// Time-series settings.
    pub timeseries: Option<TimeseriesOptions>,
    /// Expiry of time-series or clustered documents.
    pub expire_after_seconds: Option<i64>,
    /// Clustered index.
    pub clustered_index: Option<ClusteredIndex>,
    /// Record pre- and post-images for change streams.
    pub change_stream_pre_and_post_images: Option<bool>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
}

impl CreateCollectionOptions {
    /// Create a builder.
    pub fn builder() -> CreateCollectionOptionsBuilder {
        CreateCollectionOptionsBuilder::default()
    }

    fn to_command(&self, name: &str) -> Result<Document> {
        if self.pipeline.is_some() && self.view_on.is_none() {
            return Err(MongoError::invalid_argument("a view pipeline requires view_on"));
        }

        let mut command = doc! { "create": name };
        command.put_opt("capped", self.capped);
        command.put_u64("size", self.size);
        command.put_u64("max", self.max);
        command.put_opt("storageEngine", self.storage_engine.clone());
        command.put_opt("validator", self.validator.clone());
        command.put_opt("validationLevel", self.validation_level.map(ValidationLevel::as_str));
        command.put_opt("validationAction", self.validation_action.map(ValidationAction::as_str));
        command.put_opt("viewOn", self.view_on.clone());
        command.put_opt("pipeline", self.pipeline.clone());
        command.put_collation(self.collation.as_ref())?;
        command.put_opt("indexOptionDefaults", self.index_option_defaults.clone());
        if let Some(ref timeseries) = self.timeseries {
            command.insert("timeseries", bson::to_document(timeseries)?);
        }
        command.put_opt("expireAfterSeconds", self.expire_after_seconds);
        if let Some(ref clustered) = self.clustered_index {
            command.insert("clusteredIndex", bson::to_document(clustered)?);
        }
        if let Some(enabled) = self.change_stream_pre_and_post_images {
            command.insert("changeStreamPreAndPostImages", doc! { "enabled": enabled });
        }
        command.put_opt("comment", self.comment.clone());
        Ok(command)
    }
}

/// Builder for CreateCollectionOptions.
#[derive(Debug, Clone, Default)]
pub struct CreateCollectionOptionsBuilder {
    options: CreateCollectionOptions,
}

impl CreateCollectionOptionsBuilder {
    /// Set capped.
    pub fn capped(mut self, capped: bool) -> Self {
        self.options.capped = Some(capped);
        self
    }

    /// Set size.
    pub fn size(mut self, size: u64) -> Self {
        self.options.size = Some(size);
        self
    }

    /// Set max documents.
    pub fn max(mut self, max: u64) -> Self {
        self.options.max = Some(max);
        self
    }

    /// Set validator.
    pub fn validator(mut self, validator: Document) -> Self {
        self.options.validator = Some(validator);
        self
    }

    /// Set validation level and action.
    pub fn validation(mut self, level: ValidationLevel, action: ValidationAction) -> Self {
        self.options.validation_level = Some(level);
        self.options.validation_action = Some(action);
        self
    }

    /// Define a view.
    pub fn view(mut self, view_on: impl Into<String>, pipeline: Vec<Document>) -> Self {
        self.options.view_on = Some(view_on.into());
        self.options.pipeline = Some(pipeline);
        self
    }

    /// Set time-series settings.
    pub fn timeseries(mut self, timeseries: TimeseriesOptions) -> Self {
        self.options.timeseries = Some(timeseries);
        self
    }

    /// Set document expiry.
    pub fn expire_after_seconds(mut self, seconds: i64) -> Self {
        self.options.expire_after_seconds = Some(seconds);
        self
    }

    /// Cluster the collection on `_id`.
    pub fn clustered_index(mut self, index: ClusteredIndex) -> Self {
        self.options.clustered_index = Some(index);
        self
    }

    /// Set the default collation.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// Set the write concern.
    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    /// Build the options.
    pub fn build(self) -> CreateCollectionOptions {
        self.options
    }
}
