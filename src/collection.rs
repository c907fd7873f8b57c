//! Collection struct with CRUD operations.

use crate::codec::Codec;
use crate::cursor::{Cursor, CursorOptions};
use crate::db::Database;
use crate::error::{bson_to_i64, MongoError, Result, NAMESPACE_NOT_FOUND};
use crate::index::{IndexKeys, IndexModel, IndexOptions};
use crate::options::{
    AggregateOptions, CollectionOptions, CommandExt, CountOptions, CreateIndexOptions,
    CursorType, DeleteOptions, DistinctOptions, DropIndexOptions, DropOptions,
    EstimatedDocumentCountOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, InsertManyOptions, InsertOneOptions,
    ReadConcern, ReadPreference, ReplaceOptions, ReturnDocument, UpdateOptions, WriteConcern,
};
use crate::results::{
    CreateIndexResult, CreateIndexesResult, DeleteResult, InsertManyResult, InsertOneResult,
    UpdateResult,
};
use crate::session::ClientSession;
use bson::{doc, oid::ObjectId, Bson, Document};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use tracing::debug;

/// Most documents sent in one `insert` command.
pub const MAX_WRITE_BATCH_SIZE: usize = 100_000;

/// The update half of `update_one`/`update_many`/`find_one_and_update`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateModifications {
    /// Update operators such as `{"$set": {...}}`.
    Document(Document),
    /// An aggregation pipeline.
    Pipeline(Vec<Document>),
}

impl UpdateModifications {
    fn validate(&self) -> Result<()> {
        match self {
            UpdateModifications::Document(update) => {
                match update.keys().next() {
                    None => Err(MongoError::invalid_argument("update document must not be empty")),
                    Some(key) if !key.starts_with('$') => Err(MongoError::invalid_argument(format!(
                        "update document must contain only operators, found '{}'",
                        key
                    ))),
                    Some(_) => Ok(()),
                }
            }
            UpdateModifications::Pipeline(_) => Ok(()),
        }
    }

    fn into_bson(self) -> Bson {
        match self {
            UpdateModifications::Document(update) => Bson::Document(update),
            UpdateModifications::Pipeline(stages) => {
                Bson::Array(stages.into_iter().map(Bson::Document).collect())
            }
        }
    }
}

impl From<Document> for UpdateModifications {
    fn from(update: Document) -> Self {
        UpdateModifications::Document(update)
    }
}

impl From<Vec<Document>> for UpdateModifications {
    fn from(pipeline: Vec<Document>) -> Self {
        UpdateModifications::Pipeline(pipeline)
    }
}

fn index_names(indexes: &[Document]) -> Vec<String> {
    indexes
        .iter()
        .filter_map(|index| index.get_str("name").ok())
        .map(str::to_string)
        .collect()
}

fn validate_replacement(replacement: &Document) -> Result<()> {
    match replacement.keys().next() {
        Some(key) if key.starts_with('$') => Err(MongoError::invalid_argument(format!(
            "replacement document must not contain operators, found '{}'",
            key
        ))),
        _ => Ok(()),
    }
}

/// Give `document` an `_id` if it has none, placing the new id first.
fn ensure_id(document: &mut Document) -> Bson {
    if let Some(id) = document.get("_id") {
        return id.clone();
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = doc! { "_id": id.clone() };
    for (key, value) in std::mem::take(document) {
        with_id.insert(key, value);
    }
    *document = with_id;
    id
}

/// Build an `aggregate` command. `target` is the collection name, or `1`
/// for database-level pipelines.
pub(crate) fn aggregate_command(
    target: Bson,
    pipeline: Vec<Document>,
    options: &AggregateOptions,
    read_concern: Option<&ReadConcern>,
    write_concern: Option<&WriteConcern>,
) -> Result<Document> {
    let writes = pipeline
        .last()
        .map_or(false, |stage| stage.contains_key("$out") || stage.contains_key("$merge"));

    let mut cursor = Document::new();
    cursor.put_opt("batchSize", options.batch_size.map(i64::from));

    let mut command = doc! {
        "aggregate": target,
        "pipeline": pipeline,
        "cursor": cursor,
    };
    command.put_opt("allowDiskUse", options.allow_disk_use);
    command.put_opt("bypassDocumentValidation", options.bypass_document_validation);
    command.put_collation(options.collation.as_ref())?;
    command.put_opt("comment", options.comment.clone());
    command.put_hint(options.hint.as_ref());
    command.put_u64("maxTimeMS", options.max_time_ms);
    command.put_opt("let", options.let_vars.clone());
    command.put_read_concern(options.read_concern.as_ref().or(read_concern));
    if writes {
        command.put_write_concern(options.write_concern.as_ref().or(write_concern));
    }
    Ok(command)
}

/// A handle to a MongoDB collection.
///
/// # Type Parameters
///
/// * `T` - The type of documents in this collection.
///
/// # Example
///
/// ```ignore
/// use mongo_async::{Client, bson::doc};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct User {
///     name: String,
///     email: String,
/// }
///
/// let client = Client::connect("mongodb://localhost").await?;
/// let db = client.database("mydb");
/// let users = db.collection::<User>("users");
///
/// users.insert_one(User { name: "John".to_string(), email: "john@example.com".to_string() }, None).await?;
/// ```
pub struct Collection<T> {
    db: Database,
    name: String,
    read_concern: Option<ReadConcern>,
    write_concern: Option<WriteConcern>,
    read_preference: Option<ReadPreference>,
    codec: Codec,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace())
            .field("read_concern", &self.read_concern)
            .field("write_concern", &self.write_concern)
            .field("read_preference", &self.read_preference)
            .finish()
    }
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        self.clone_with_type()
    }
}

impl<T> Collection<T> {
    /// Create a new collection handle.
    pub(crate) fn new(db: Database, name: String, options: CollectionOptions) -> Self {
        let read_concern = options.read_concern.or_else(|| db.read_concern.clone());
        let write_concern = options.write_concern.or_else(|| db.write_concern.clone());
        let read_preference = options
            .read_preference
            .or_else(|| db.read_preference.clone());
        let codec = options
            .codec_options
            .map(Codec::new)
            .unwrap_or_else(|| db.codec.clone());

        Self {
            db,
            name,
            read_concern,
            write_concern,
            read_preference,
            codec,
            _marker: PhantomData,
        }
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the database name.
    pub fn database_name(&self) -> &str {
        self.db.name()
    }

    /// The owning database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Get the full namespace (db.collection).
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.db.name(), self.name)
    }

    /// Alias of [`Collection::namespace`].
    pub fn full_name(&self) -> String {
        self.namespace()
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

    /// Codec applied to documents of this collection.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Clone this collection with a new type parameter.
    pub fn clone_with_type<U>(&self) -> Collection<U> {
        Collection {
            db: self.db.clone(),
            name: self.name.clone(),
            read_concern: self.read_concern.clone(),
            write_concern: self.write_concern.clone(),
            read_preference: self.read_preference.clone(),
            codec: self.codec.clone(),
            _marker: PhantomData,
        }
    }

    async fn execute(
        &self,
        command: Document,
        session: Option<&ClientSession>,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document> {
        self.db.execute(command, session, read_preference).await
    }

    fn open_cursor<U>(
        &self,
        reply: &Document,
        session: ClientSession,
        options: CursorOptions,
    ) -> Result<Cursor<U>> {
        Cursor::from_reply(
            self.db.client.clone(),
            Some(session),
            self.db.name(),
            &self.name,
            reply,
            options,
            self.codec.clone(),
        )
    }

    fn effective_write_concern<'a>(
        &'a self,
        option: Option<&'a WriteConcern>,
    ) -> Option<&'a WriteConcern> {
        option.or(self.write_concern.as_ref())
    }

    fn update_bson(&self, update: UpdateModifications) -> Bson {
        match update {
            UpdateModifications::Document(update) => {
                Bson::Document(self.codec.outgoing_update(update))
            }
            pipeline => pipeline.into_bson(),
        }
    }

    fn effective_read_preference(&self, option: Option<&ReadPreference>) -> Option<ReadPreference> {
        option.or(self.read_preference.as_ref()).cloned()
    }

    /// Split prepared documents into `insert` batches bounded by count and
    /// encoded size. Oversized documents fail here, before dispatch.
    fn split_batches(&self, documents: &[Document]) -> Result<Vec<Range<usize>>> {
        let byte_limit = self.codec.options().max_document_size;
        let mut batches = Vec::new();
        let mut start = 0;
        let mut bytes = 0;
        for (i, document) in documents.iter().enumerate() {
            let len = self.codec.checked_len(document)?;
            if i > start && (bytes + len > byte_limit || i - start >= MAX_WRITE_BATCH_SIZE) {
                batches.push(start..i);
                start = i;
                bytes = 0;
            }
            bytes += len;
        }
        batches.push(start..documents.len());
        Ok(batches)
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static> Collection<T> {
    // ========================================================================
    // Queries
    // ========================================================================

    /// Find documents matching a filter.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let cursor = collection.find(doc! { "status": "active" }, None).await?;
    /// let docs: Vec<User> = cursor.collect().await?;
    /// ```
    pub async fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Cursor<T>> {
        self.find_common(filter.into(), options.into(), None).await
    }

    /// Find documents under a session.
    pub async fn find_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
        session: &ClientSession,
    ) -> Result<Cursor<T>> {
        self.find_common(filter.into(), options.into(), Some(session))
            .await
    }

    pub(crate) async fn find_common(
        &self,
        filter: Option<Document>,
        options: Option<FindOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Cursor<T>> {
        let options = options.unwrap_or_default();
        let command = self.find_command(filter.unwrap_or_default(), &options)?;
        let read_preference = self.effective_read_preference(options.read_preference.as_ref());

        let session = self.db.client.cursor_session(session).await?;
        let reply = self
            .execute(command, Some(&session), read_preference.as_ref())
            .await?;

        let cursor_type = options.cursor_type.unwrap_or_default();
        self.open_cursor(
            &reply,
            session,
            CursorOptions {
                batch_size: options.batch_size,
                max_await_time_ms: options
                    .max_await_time_ms
                    .filter(|_| cursor_type == CursorType::TailableAwait),
                tailable: cursor_type != CursorType::NonTailable,
                read_preference,
                comment: options.comment,
            },
        )
    }

    fn find_command(&self, filter: Document, options: &FindOptions) -> Result<Document> {
        let mut command = doc! {
            "find": self.name.as_str(),
            "filter": self.codec.outgoing_filter(filter),
        };
        command.put_opt("sort", options.sort.clone().map(|sort| self.codec.outgoing(sort)));
        command.put_opt(
            "projection",
            options.projection.clone().map(|projection| self.codec.outgoing(projection)),
        );
        command.put_hint(options.hint.as_ref());
        command.put_u64("skip", options.skip);
        match options.limit {
            Some(limit) if limit < 0 => {
                command.insert("limit", limit.saturating_abs());
                command.insert("singleBatch", true);
            }
            Some(limit) if limit > 0 => {
                command.insert("limit", limit);
            }
            _ => {}
        }
        command.put_opt("batchSize", options.batch_size.map(i64::from));
        command.put_opt("comment", options.comment.clone());
        command.put_u64("maxTimeMS", options.max_time_ms);
        command.put_read_concern(options.read_concern.as_ref().or(self.read_concern.as_ref()));
        command.put_opt("max", options.max.clone());
        command.put_opt("min", options.min.clone());
        command.put_opt("returnKey", options.return_key);
        command.put_opt("showRecordId", options.show_record_id);
        match options.cursor_type.unwrap_or_default() {
            CursorType::NonTailable => {}
            CursorType::Tailable => {
                command.insert("tailable", true);
            }
            CursorType::TailableAwait => {
                command.insert("tailable", true);
                command.insert("awaitData", true);
            }
        }
        command.put_opt("noCursorTimeout", options.no_cursor_timeout);
        command.put_opt("allowPartialResults", options.allow_partial_results);
        command.put_collation(options.collation.as_ref())?;
        command.put_opt("allowDiskUse", options.allow_disk_use);
        command.put_opt("let", options.let_vars.clone());
        Ok(command)
    }

    /// Find a single document.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let user = collection.find_one(doc! { "email": "john@example.com" }, None).await?;
    /// ```
    pub async fn find_one(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<Option<T>> {
        self.find_one_common(filter.into(), options.into(), None)
            .await
    }

    /// Find a single document under a session.
    pub async fn find_one_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOneOptions>>,
        session: &ClientSession,
    ) -> Result<Option<T>> {
        self.find_one_common(filter.into(), options.into(), Some(session))
            .await
    }

    /// Find the document whose `_id` equals `id`.
    pub async fn find_one_by_id(
        &self,
        id: impl Into<Bson>,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<Option<T>> {
        self.find_one_common(Some(doc! { "_id": id.into() }), options.into(), None)
            .await
    }

    /// Find the document whose `_id` equals `id` under a session.
    pub async fn find_one_by_id_with_session(
        &self,
        id: impl Into<Bson>,
        options: impl Into<Option<FindOneOptions>>,
        session: &ClientSession,
    ) -> Result<Option<T>> {
        self.find_one_common(Some(doc! { "_id": id.into() }), options.into(), Some(session))
            .await
    }

    pub(crate) async fn find_one_common(
        &self,
        filter: Option<Document>,
        options: Option<FindOneOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Option<T>> {
        let options: FindOptions = options.unwrap_or_default().into();
        let mut cursor = self.find_common(filter, Some(options), session).await?;
        cursor.try_next().await
    }

    /// Find a single document and render it as relaxed extended JSON.
    ///
    /// Datetimes are rendered per the codec's `tz_aware` and `timezone`
    /// settings.
    pub async fn find_one_json(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOneOptions>>,
    ) -> Result<Option<JsonValue>> {
        let options: FindOptions = options.into().unwrap_or_default().into();
        let mut cursor = self.find_common(filter.into(), Some(options), None).await?;
        cursor.next_json().await
    }

    /// Find all matching documents and collect them.
    pub async fn find_many(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<T>> {
        self.find_common(filter.into(), options.into(), None)
            .await?
            .collect()
            .await
    }

    /// Find all matching documents under a session.
    pub async fn find_many_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
        session: &ClientSession,
    ) -> Result<Vec<T>> {
        self.find_common(filter.into(), options.into(), Some(session))
            .await?
            .collect()
            .await
    }

    /// Run an aggregation pipeline.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let pipeline = vec![
    ///     doc! { "$match": { "status": "active" } },
    ///     doc! { "$group": { "_id": "$category", "count": { "$sum": 1 } } },
    /// ];
    /// let cursor = collection.aggregate(pipeline, None).await?;
    /// ```
    pub async fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor<Document>> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), None)
            .await
    }

    /// Run an aggregation pipeline under a session.
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
        let writes = pipeline
            .last()
            .map_or(false, |stage| stage.contains_key("$out") || stage.contains_key("$merge"));
        let command = aggregate_command(
            Bson::String(self.name.clone()),
            pipeline,
            &options,
            self.read_concern.as_ref(),
            self.write_concern.as_ref(),
        )?;
        // $out and $merge must run on the primary.
        let read_preference = if writes {
            None
        } else {
            self.effective_read_preference(options.read_preference.as_ref())
        };

        let session = self.db.client.cursor_session(session).await?;
        let reply = self
            .execute(command, Some(&session), read_preference.as_ref())
            .await?;
        self.open_cursor(
            &reply,
            session,
            CursorOptions {
                batch_size: options.batch_size,
                max_await_time_ms: options.max_await_time_ms,
                read_preference,
                comment: options.comment,
                ..Default::default()
            },
        )
    }

    /// Count documents matching a filter.
    pub async fn count_documents(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<CountOptions>>,
    ) -> Result<u64> {
        self.count_documents_common(filter.into(), options.into(), None)
            .await
    }

    /// Count documents under a session.
    pub async fn count_documents_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<CountOptions>>,
        session: &ClientSession,
    ) -> Result<u64> {
        self.count_documents_common(filter.into(), options.into(), Some(session))
            .await
    }

    async fn count_documents_common(
        &self,
        filter: Option<Document>,
        options: Option<CountOptions>,
        session: Option<&ClientSession>,
    ) -> Result<u64> {
        let options = options.unwrap_or_default();
        let filter = self.codec.outgoing_filter(filter.unwrap_or_default());
        let mut pipeline = vec![doc! { "$match": filter }];
        if let Some(skip) = options.skip {
            let skip = skip as i64;
            pipeline.push(doc! { "$skip": skip });
        }
        if let Some(limit) = options.limit {
            let limit = limit as i64;
            pipeline.push(doc! { "$limit": limit });
        }
        pipeline.push(doc! { "$group": { "_id": 1, "n": { "$sum": 1 } } });

        let aggregate_options = AggregateOptions {
            collation: options.collation,
            comment: options.comment,
            hint: options.hint,
            max_time_ms: options.max_time_ms,
            read_concern: options.read_concern,
            read_preference: options.read_preference,
            ..Default::default()
        };
        let mut cursor = self
            .aggregate_common(pipeline, Some(aggregate_options), session)
            .await?;
        let count = match cursor.try_next().await? {
            Some(result) => result.get("n").and_then(bson_to_i64).unwrap_or(0),
            None => 0,
        };
        Ok(count as u64)
    }

    /// Estimated document count from collection metadata.
    pub async fn estimated_document_count(
        &self,
        options: impl Into<Option<EstimatedDocumentCountOptions>>,
    ) -> Result<u64> {
        self.estimated_document_count_common(options.into(), None)
            .await
    }

    /// Estimated document count under a session.
    pub async fn estimated_document_count_with_session(
        &self,
        options: impl Into<Option<EstimatedDocumentCountOptions>>,
        session: &ClientSession,
    ) -> Result<u64> {
        self.estimated_document_count_common(options.into(), Some(session))
            .await
    }

    async fn estimated_document_count_common(
        &self,
        options: Option<EstimatedDocumentCountOptions>,
        session: Option<&ClientSession>,
    ) -> Result<u64> {
        let options = options.unwrap_or_default();
        let mut command = doc! { "count": self.name.as_str() };
        command.put_u64("maxTimeMS", options.max_time_ms);
        command.put_opt("comment", options.comment);
        command.put_read_concern(options.read_concern.as_ref().or(self.read_concern.as_ref()));
        let read_preference = self.effective_read_preference(options.read_preference.as_ref());

        let reply = self
            .execute(command, session, read_preference.as_ref())
            .await?;
        Ok(reply.get("n").and_then(bson_to_i64).unwrap_or(0) as u64)
    }

    /// Get distinct values for a field.
    pub async fn distinct(
        &self,
        field_name: &str,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<DistinctOptions>>,
    ) -> Result<Vec<Bson>> {
        self.distinct_common(field_name, filter.into(), options.into(), None)
            .await
    }

    /// Get distinct values under a session.
    pub async fn distinct_with_session(
        &self,
        field_name: &str,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<DistinctOptions>>,
        session: &ClientSession,
    ) -> Result<Vec<Bson>> {
        self.distinct_common(field_name, filter.into(), options.into(), Some(session))
            .await
    }

    async fn distinct_common(
        &self,
        field_name: &str,
        filter: Option<Document>,
        options: Option<DistinctOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Vec<Bson>> {
        let options = options.unwrap_or_default();
        let mut command = doc! {
            "distinct": self.name.as_str(),
            "key": self.codec.outgoing_path(field_name),
            "query": self.codec.outgoing_filter(filter.unwrap_or_default()),
        };
        command.put_collation(options.collation.as_ref())?;
        command.put_opt("comment", options.comment);
        command.put_u64("maxTimeMS", options.max_time_ms);
        command.put_read_concern(options.read_concern.as_ref().or(self.read_concern.as_ref()));
        let read_preference = self.effective_read_preference(options.read_preference.as_ref());

        let reply = self
            .execute(command, session, read_preference.as_ref())
            .await?;
        Ok(reply.get_array("values").cloned().unwrap_or_default())
    }

    // ========================================================================
    // Inserts
    // ========================================================================

    fn prepare(&self, value: &T) -> Result<(Document, Bson)> {
        let mut document = self.codec.to_document(value)?;
        let id = ensure_id(&mut document);
        Ok((document, id))
    }

    /// Insert a single document. An `_id` is generated when missing.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = collection.insert_one(doc! { "name": "John" }, None).await?;
    /// println!("Inserted ID: {:?}", result.inserted_id);
    /// ```
    pub async fn insert_one(
        &self,
        document: impl Into<T>,
        options: impl Into<Option<InsertOneOptions>>,
    ) -> Result<InsertOneResult> {
        self.insert_one_common(document.into(), options.into(), None)
            .await
    }

    /// Insert a single document under a session.
    pub async fn insert_one_with_session(
        &self,
        document: impl Into<T>,
        options: impl Into<Option<InsertOneOptions>>,
        session: &ClientSession,
    ) -> Result<InsertOneResult> {
        self.insert_one_common(document.into(), options.into(), Some(session))
            .await
    }

    pub(crate) async fn insert_one_common(
        &self,
        document: T,
        options: Option<InsertOneOptions>,
        session: Option<&ClientSession>,
    ) -> Result<InsertOneResult> {
        let options = options.unwrap_or_default();
        let (document, inserted_id) = self.prepare(&document)?;
        self.codec.checked_len(&document)?;

        let mut command = doc! {
            "insert": self.name.as_str(),
            "documents": [document],
        };
        command.put_opt("bypassDocumentValidation", options.bypass_document_validation);
        command.put_write_concern(self.effective_write_concern(options.write_concern.as_ref()));
        command.put_opt("comment", options.comment);

        self.execute(command, session, None).await?;
        Ok(InsertOneResult { inserted_id })
    }

    /// Insert multiple documents.
    ///
    /// Ordered inserts (the default) stop at the first failed write;
    /// unordered inserts attempt every document and report all failures.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let docs = vec![
    ///     doc! { "name": "John" },
    ///     doc! { "name": "Jane" },
    /// ];
    /// let result = collection.insert_many(docs, None).await?;
    /// ```
    pub async fn insert_many(
        &self,
        documents: impl IntoIterator<Item = impl Into<T>>,
        options: impl Into<Option<InsertManyOptions>>,
    ) -> Result<InsertManyResult> {
        let documents = documents
            .into_iter()
            .map(|document| self.prepare(&document.into()).map(|(document, _)| document))
            .collect::<Result<Vec<_>>>()?;
        self.insert_many_common(documents, options.into(), None)
            .await
    }

    /// Insert multiple documents under a session.
    pub async fn insert_many_with_session(
        &self,
        documents: impl IntoIterator<Item = impl Into<T>>,
        options: impl Into<Option<InsertManyOptions>>,
        session: &ClientSession,
    ) -> Result<InsertManyResult> {
        let documents = documents
            .into_iter()
            .map(|document| self.prepare(&document.into()).map(|(document, _)| document))
            .collect::<Result<Vec<_>>>()?;
        self.insert_many_common(documents, options.into(), Some(session))
            .await
    }

    pub(crate) async fn insert_many_common(
        &self,
        documents: Vec<Document>,
        options: Option<InsertManyOptions>,
        session: Option<&ClientSession>,
    ) -> Result<InsertManyResult> {
        if documents.is_empty() {
            return Err(MongoError::invalid_argument(
                "insert_many requires at least one document",
            ));
        }
        let options = options.unwrap_or_default();
        let ordered = options.ordered.unwrap_or(true);
        let write_concern = self.effective_write_concern(options.write_concern.as_ref());
        let inserted_ids: Vec<Bson> = documents
            .iter()
            .map(|document| document.get("_id").cloned().unwrap_or(Bson::Null))
            .collect();
        let batches = self.split_batches(&documents)?;

        let mut failures = Vec::new();
        let mut write_concern_failure = None;
        let mut applied = 0u64;
        for batch in batches {
            let start = batch.start;
            let len = batch.len();
            debug!(ns = %self.namespace(), start, len, "inserting batch");

            let mut command = doc! {
                "insert": self.name.as_str(),
                "documents": documents[batch].to_vec(),
                "ordered": ordered,
            };
            command.put_opt("bypassDocumentValidation", options.bypass_document_validation);
            command.put_write_concern(write_concern);
            command.put_opt("comment", options.comment.clone());

            match self.execute(command, session, None).await {
                Ok(reply) => {
                    applied += reply.get("n").and_then(bson_to_i64).unwrap_or(len as i64) as u64;
                }
                Err(e) => {
                    let (batch_failures, batch_wce) = e.into_write_failures()?;
                    let batch_applied = if ordered {
                        batch_failures.first().map_or(len, |f| f.index.min(len))
                    } else {
                        len.saturating_sub(batch_failures.len())
                    };
                    applied += batch_applied as u64;
                    let stop = ordered && !batch_failures.is_empty();
                    failures.extend(batch_failures.into_iter().map(|mut failure| {
                        failure.index += start;
                        failure
                    }));
                    if batch_wce.is_some() {
                        write_concern_failure = batch_wce;
                    }
                    if stop {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() && write_concern_failure.is_none() {
            return Ok(InsertManyResult { inserted_ids });
        }
        Err(MongoError::from_write_failures(
            failures,
            write_concern_failure,
            applied,
        ))
    }

    // ========================================================================
    // Updates and deletes
    // ========================================================================

    /// Update a single document.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = collection.update_one(
    ///     doc! { "_id": id },
    ///     doc! { "$set": { "name": "Jane" } },
    ///     None,
    /// ).await?;
    /// ```
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), options.into(), false, None)
            .await
    }

    /// Update a single document under a session.
    pub async fn update_one_with_session(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &ClientSession,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), options.into(), false, Some(session))
            .await
    }

    /// Update all matching documents.
    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), options.into(), true, None)
            .await
    }

    /// Update all matching documents under a session.
    pub async fn update_many_with_session(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &ClientSession,
    ) -> Result<UpdateResult> {
        self.update_common(filter, update.into(), options.into(), true, Some(session))
            .await
    }

    async fn update_common(
        &self,
        filter: Document,
        update: UpdateModifications,
        options: Option<UpdateOptions>,
        multi: bool,
        session: Option<&ClientSession>,
    ) -> Result<UpdateResult> {
        update.validate()?;
        let update = self.update_bson(update);
        self.send_update(filter, update, options.unwrap_or_default(), multi, session)
            .await
    }

    /// Replace a single document.
    pub async fn replace_one(
        &self,
        filter: Document,
        replacement: impl Into<T>,
        options: impl Into<Option<ReplaceOptions>>,
    ) -> Result<UpdateResult> {
        self.replace_one_common(filter, replacement.into(), options.into(), None)
            .await
    }

    /// Replace a single document under a session.
    pub async fn replace_one_with_session(
        &self,
        filter: Document,
        replacement: impl Into<T>,
        options: impl Into<Option<ReplaceOptions>>,
        session: &ClientSession,
    ) -> Result<UpdateResult> {
        self.replace_one_common(filter, replacement.into(), options.into(), Some(session))
            .await
    }

    async fn replace_one_common(
        &self,
        filter: Document,
        replacement: T,
        options: Option<ReplaceOptions>,
        session: Option<&ClientSession>,
    ) -> Result<UpdateResult> {
        let replacement = self.codec.to_document(&replacement)?;
        validate_replacement(&replacement)?;
        self.codec.checked_len(&replacement)?;
        let options: UpdateOptions = options.unwrap_or_default().into();
        self.send_update(filter, Bson::Document(replacement), options, false, session)
            .await
    }

    async fn send_update(
        &self,
        filter: Document,
        update: Bson,
        options: UpdateOptions,
        multi: bool,
        session: Option<&ClientSession>,
    ) -> Result<UpdateResult> {
        let mut statement = doc! {
            "q": self.codec.outgoing_filter(filter),
            "u": update,
            "multi": multi,
        };
        statement.put_opt("upsert", options.upsert);
        statement.put_opt("arrayFilters", options.array_filters);
        statement.put_collation(options.collation.as_ref())?;
        statement.put_hint(options.hint.as_ref());

        let mut command = doc! {
            "update": self.name.as_str(),
            "updates": [statement],
            "ordered": true,
        };
        command.put_opt("bypassDocumentValidation", options.bypass_document_validation);
        command.put_write_concern(self.effective_write_concern(options.write_concern.as_ref()));
        command.put_opt("comment", options.comment);
        command.put_opt("let", options.let_vars);

        let reply = self.execute(command, session, None).await?;
        Ok(UpdateResult::from_reply(&reply))
    }

    /// Delete a single document.
    pub async fn delete_one(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, options.into(), false, None)
            .await
    }

    /// Delete a single document under a session.
    pub async fn delete_one_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
        session: &ClientSession,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, options.into(), false, Some(session))
            .await
    }

    /// Delete all matching documents.
    pub async fn delete_many(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, options.into(), true, None).await
    }

    /// Delete all matching documents under a session.
    pub async fn delete_many_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
        session: &ClientSession,
    ) -> Result<DeleteResult> {
        self.delete_common(filter, options.into(), true, Some(session))
            .await
    }

    pub(crate) async fn delete_common(
        &self,
        filter: Document,
        options: Option<DeleteOptions>,
        multi: bool,
        session: Option<&ClientSession>,
    ) -> Result<DeleteResult> {
        let options = options.unwrap_or_default();
        let mut statement = doc! {
            "q": self.codec.outgoing_filter(filter),
            "limit": if multi { 0 } else { 1 },
        };
        statement.put_collation(options.collation.as_ref())?;
        statement.put_hint(options.hint.as_ref());

        let mut command = doc! {
            "delete": self.name.as_str(),
            "deletes": [statement],
            "ordered": true,
        };
        command.put_write_concern(self.effective_write_concern(options.write_concern.as_ref()));
        command.put_opt("comment", options.comment);
        command.put_opt("let", options.let_vars);

        let reply = self.execute(command, session, None).await?;
        Ok(DeleteResult::from_reply(&reply))
    }

    // ========================================================================
    // Find and modify
    // ========================================================================

    /// Find one document and update it.
    ///
    /// Returns the document as it was before the update unless
    /// `return_document` is [`ReturnDocument::After`].
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<FindOneAndUpdateOptions>>,
    ) -> Result<Option<T>> {
        self.find_one_and_update_common(filter, update.into(), options.into(), None)
            .await
    }

    /// Find one document and update it under a session.
    pub async fn find_one_and_update_with_session(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<FindOneAndUpdateOptions>>,
        session: &ClientSession,
    ) -> Result<Option<T>> {
        self.find_one_and_update_common(filter, update.into(), options.into(), Some(session))
            .await
    }

    async fn find_one_and_update_common(
        &self,
        filter: Document,
        update: UpdateModifications,
        options: Option<FindOneAndUpdateOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Option<T>> {
        update.validate()?;
        let options = options.unwrap_or_default();
        let mut command = doc! {
            "findAndModify": self.name.as_str(),
            "query": self.codec.outgoing_filter(filter),
            "update": self.update_bson(update),
            "new": options.return_document.unwrap_or_default() == ReturnDocument::After,
        };
        command.put_opt("upsert", options.upsert);
        command.put_opt("arrayFilters", options.array_filters);
        command.put_opt("bypassDocumentValidation", options.bypass_document_validation);
        self.finish_find_and_modify(
            command,
            FindAndModifyCommon {
                sort: options.sort,
                projection: options.projection,
                collation: options.collation,
                hint: options.hint,
                max_time_ms: options.max_time_ms,
                write_concern: options.write_concern,
                comment: options.comment,
                let_vars: options.let_vars,
            },
            session,
        )
        .await
    }

    /// Find one document and replace it.
    pub async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: impl Into<T>,
        options: impl Into<Option<FindOneAndReplaceOptions>>,
    ) -> Result<Option<T>> {
        self.find_one_and_replace_common(filter, replacement.into(), options.into(), None)
            .await
    }

    /// Find one document and replace it under a session.
    pub async fn find_one_and_replace_with_session(
        &self,
        filter: Document,
        replacement: impl Into<T>,
        options: impl Into<Option<FindOneAndReplaceOptions>>,
        session: &ClientSession,
    ) -> Result<Option<T>> {
        self.find_one_and_replace_common(filter, replacement.into(), options.into(), Some(session))
            .await
    }

    async fn find_one_and_replace_common(
        &self,
        filter: Document,
        replacement: T,
        options: Option<FindOneAndReplaceOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Option<T>> {
        let replacement = self.codec.to_document(&replacement)?;
        validate_replacement(&replacement)?;
        self.codec.checked_len(&replacement)?;

        let options: FindOneAndUpdateOptions = options.unwrap_or_default().into();
        let mut command = doc! {
            "findAndModify": self.name.as_str(),
            "query": self.codec.outgoing_filter(filter),
            "update": replacement,
            "new": options.return_document.unwrap_or_default() == ReturnDocument::After,
        };
        command.put_opt("upsert", options.upsert);
        command.put_opt("bypassDocumentValidation", options.bypass_document_validation);
        self.finish_find_and_modify(
            command,
            FindAndModifyCommon {
                sort: options.sort,
                projection: options.projection,
                collation: options.collation,
                hint: options.hint,
                max_time_ms: options.max_time_ms,
                write_concern: options.write_concern,
                comment: options.comment,
                let_vars: options.let_vars,
            },
            session,
        )
        .await
    }

    /// Find one document and delete it.
    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        options: impl Into<Option<FindOneAndDeleteOptions>>,
    ) -> Result<Option<T>> {
        self.find_one_and_delete_common(filter, options.into(), None)
            .await
    }

    /// Find one document and delete it under a session.
    pub async fn find_one_and_delete_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<FindOneAndDeleteOptions>>,
        session: &ClientSession,
    ) -> Result<Option<T>> {
        self.find_one_and_delete_common(filter, options.into(), Some(session))
            .await
    }

    async fn find_one_and_delete_common(
        &self,
        filter: Document,
        options: Option<FindOneAndDeleteOptions>,
        session: Option<&ClientSession>,
    ) -> Result<Option<T>> {
        let options = options.unwrap_or_default();
        let command = doc! {
            "findAndModify": self.name.as_str(),
            "query": self.codec.outgoing_filter(filter),
            "remove": true,
        };
        self.finish_find_and_modify(
            command,
            FindAndModifyCommon {
                sort: options.sort,
                projection: options.projection,
                collation: options.collation,
                hint: options.hint,
                max_time_ms: options.max_time_ms,
                write_concern: options.write_concern,
                comment: options.comment,
                let_vars: options.let_vars,
            },
            session,
        )
        .await
    }

    async fn finish_find_and_modify(
        &self,
        mut command: Document,
        common: FindAndModifyCommon,
        session: Option<&ClientSession>,
    ) -> Result<Option<T>> {
        command.put_opt("sort", common.sort.map(|sort| self.codec.outgoing(sort)));
        command.put_opt("fields", common.projection.map(|fields| self.codec.outgoing(fields)));
        command.put_collation(common.collation.as_ref())?;
        command.put_hint(common.hint.as_ref());
        command.put_u64("maxTimeMS", common.max_time_ms);
        command.put_write_concern(self.effective_write_concern(common.write_concern.as_ref()));
        command.put_opt("comment", common.comment);
        command.put_opt("let", common.let_vars);

        let reply = self.execute(command, session, None).await?;
        match reply.get("value") {
            Some(Bson::Document(value)) => self.codec.from_document(value.clone()).map(Some),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Create an index.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = collection
    ///     .create_index(vec![("email", 1), ("created_at", -1)], None, None)
    ///     .await?;
    /// assert_eq!(result.index_name, "email_1_created_at_-1");
    /// ```
    pub async fn create_index(
        &self,
        keys: impl Into<IndexKeys>,
        index_options: impl Into<Option<IndexOptions>>,
        options: impl Into<Option<CreateIndexOptions>>,
    ) -> Result<CreateIndexResult> {
        let mut model = IndexModel::new(keys);
        model.options = index_options.into();
        let mut result = self
            .create_indexes_common(vec![model], options.into(), None)
            .await?;
        Ok(CreateIndexResult {
            index_name: result.index_names.swap_remove(0),
        })
    }

    /// Create an index under a session.
    pub async fn create_index_with_session(
        &self,
        keys: impl Into<IndexKeys>,
        index_options: impl Into<Option<IndexOptions>>,
        options: impl Into<Option<CreateIndexOptions>>,
        session: &ClientSession,
    ) -> Result<CreateIndexResult> {
        let mut model = IndexModel::new(keys);
        model.options = index_options.into();
        let mut result = self
            .create_indexes_common(vec![model], options.into(), Some(session))
            .await?;
        Ok(CreateIndexResult {
            index_name: result.index_names.swap_remove(0),
        })
    }

    /// Create several indexes in one command.
    pub async fn create_indexes(
        &self,
        models: impl IntoIterator<Item = IndexModel>,
        options: impl Into<Option<CreateIndexOptions>>,
    ) -> Result<CreateIndexesResult> {
        self.create_indexes_common(models.into_iter().collect(), options.into(), None)
            .await
    }

    /// Create several indexes under a session.
    pub async fn create_indexes_with_session(
        &self,
        models: impl IntoIterator<Item = IndexModel>,
        options: impl Into<Option<CreateIndexOptions>>,
        session: &ClientSession,
    ) -> Result<CreateIndexesResult> {
        self.create_indexes_common(models.into_iter().collect(), options.into(), Some(session))
            .await
    }

    async fn create_indexes_common(
        &self,
        models: Vec<IndexModel>,
        options: Option<CreateIndexOptions>,
        session: Option<&ClientSession>,
    ) -> Result<CreateIndexesResult> {
        if models.is_empty() {
            return Err(MongoError::invalid_argument("no index models given"));
        }
        if models.iter().any(|model| model.keys.is_empty()) {
            return Err(MongoError::invalid_argument("index keys must not be empty"));
        }
        let options = options.unwrap_or_default();
        let index_names: Vec<String> = models.iter().map(IndexModel::name).collect();
        let indexes = models
            .iter()
            .map(IndexModel::to_document)
            .collect::<Result<Vec<_>>>()?;

        let mut command = doc! {
            "createIndexes": self.name.as_str(),
            "indexes": indexes,
        };
        command.put_opt("commitQuorum", options.commit_quorum);
        command.put_opt("comment", options.comment);
        command.put_u64("maxTimeMS", options.max_time_ms);
        command.put_write_concern(self.effective_write_concern(options.write_concern.as_ref()));

        debug!(ns = %self.namespace(), indexes = ?index_names, "creating indexes");
        self.execute(command, session, None).await?;
        Ok(CreateIndexesResult { index_names })
    }

    /// Drop an index by name.
    pub async fn drop_index(
        &self,
        name: &str,
        options: impl Into<Option<DropIndexOptions>>,
    ) -> Result<()> {
        if name == "*" {
            return Err(MongoError::invalid_argument(
                "use drop_indexes to drop every index",
            ));
        }
        self.drop_indexes_common(name, options.into(), None).await
    }

    /// Drop an index by name under a session.
    pub async fn drop_index_with_session(
        &self,
        name: &str,
        options: impl Into<Option<DropIndexOptions>>,
        session: &ClientSession,
    ) -> Result<()> {
        if name == "*" {
            return Err(MongoError::invalid_argument(
                "use drop_indexes to drop every index",
            ));
        }
        self.drop_indexes_common(name, options.into(), Some(session))
            .await
    }

    /// Drop every index except `_id_`.
    pub async fn drop_indexes(&self, options: impl Into<Option<DropIndexOptions>>) -> Result<()> {
        self.drop_indexes_common("*", options.into(), None).await
    }

    /// Drop every index except `_id_` under a session.
    pub async fn drop_indexes_with_session(
        &self,
        options: impl Into<Option<DropIndexOptions>>,
        session: &ClientSession,
    ) -> Result<()> {
        self.drop_indexes_common("*", options.into(), Some(session))
            .await
    }

    async fn drop_indexes_common(
        &self,
        index: &str,
        options: Option<DropIndexOptions>,
        session: Option<&ClientSession>,
    ) -> Result<()> {
        let options = options.unwrap_or_default();
        let mut command = doc! {
            "dropIndexes": self.name.as_str(),
            "index": index,
        };
        command.put_opt("comment", options.comment);
        command.put_u64("maxTimeMS", options.max_time_ms);
        command.put_write_concern(self.effective_write_concern(options.write_concern.as_ref()));
        self.execute(command, session, None).await?;
        Ok(())
    }

    /// List index definitions. A missing collection has no indexes.
    pub async fn list_indexes(&self) -> Result<Vec<Document>> {
        self.list_indexes_common(None).await
    }

    /// List index definitions under a session.
    pub async fn list_indexes_with_session(&self, session: &ClientSession) -> Result<Vec<Document>> {
        self.list_indexes_common(Some(session)).await
    }

    async fn list_indexes_common(&self, session: Option<&ClientSession>) -> Result<Vec<Document>> {
        let command = doc! {
            "listIndexes": self.name.as_str(),
            "cursor": {},
        };
        let session = self.db.client.cursor_session(session).await?;
        let reply = match self.execute(command, Some(&session), None).await {
            Ok(reply) => reply,
            Err(e) if e.code() == Some(NAMESPACE_NOT_FOUND) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let cursor: Cursor<Document> = Cursor::from_reply(
            self.db.client.clone(),
            Some(session),
            self.db.name(),
            &self.name,
            &reply,
            CursorOptions::default(),
            Codec::default(),
        )?;
        cursor.collect().await
    }

    /// Names of every index on this collection.
    pub async fn list_index_names(&self) -> Result<Vec<String>> {
        Ok(index_names(&self.list_indexes_common(None).await?))
    }

    /// Names of every index on this collection, under a session.
    pub async fn list_index_names_with_session(&self, session: &ClientSession) -> Result<Vec<String>> {
        Ok(index_names(&self.list_indexes_common(Some(session)).await?))
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Drop this collection. Dropping a missing collection succeeds.
    pub async fn drop(&self, options: impl Into<Option<DropOptions>>) -> Result<()> {
        self.drop_common(options.into(), None).await
    }

    /// Drop this collection under a session.
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
        let mut command = doc! { "drop": self.name.as_str() };
        command.put_write_concern(self.effective_write_concern(options.write_concern.as_ref()));

        debug!(ns = %self.namespace(), "dropping collection");
        match self.execute(command, session, None).await {
            Err(e) if e.code() == Some(NAMESPACE_NOT_FOUND) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

impl Collection<Document> {
    /// Insert `document`, writing a generated `_id` back into it.
    pub async fn insert_one_in_place(
        &self,
        document: &mut Document,
        options: impl Into<Option<InsertOneOptions>>,
    ) -> Result<InsertOneResult> {
        ensure_id(document);
        self.insert_one(document.clone(), options).await
    }

    /// Insert `documents`, writing generated `_id`s back into them.
    pub async fn insert_many_in_place(
        &self,
        documents: &mut [Document],
        options: impl Into<Option<InsertManyOptions>>,
    ) -> Result<InsertManyResult> {
        for document in documents.iter_mut() {
            ensure_id(document);
        }
        self.insert_many(documents.iter().cloned(), options).await
    }
}

/// Options shared by the three findAndModify flavours.
struct FindAndModifyCommon {
    sort: Option<Document>,
    projection: Option<Document>,
    collation: Option<crate::options::Collation>,
    hint: Option<crate::options::Hint>,
    max_time_ms: Option<u64>,
    write_concern: Option<WriteConcern>,
    comment: Option<Bson>,
    let_vars: Option<Document>,
}
