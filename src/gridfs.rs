//! GridFS: chunked file storage over a `files` and a `chunks` collection.

use crate::codec::KeyCase;
use crate::collection::Collection;
use crate::db::Database;
use crate::error::{MongoError, Result};
use crate::index::{IndexModel, IndexOptions};
use crate::options::{
    CollectionOptions, FindOneOptions, FindOptions, ReadConcern, ReadPreference, WriteConcern,
};
use crate::session::ClientSession;
use bson::spec::BinarySubtype;
use bson::{doc, oid::ObjectId, Binary, Bson, Document};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bucket used when none is named.
pub const DEFAULT_BUCKET_NAME: &str = "fs";

/// Chunk size used when none is given (255 KiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: u32 = 255 * 1024;

/// Options for a GridFS bucket.
#[derive(Debug, Clone, Default)]
pub struct GridFsBucketOptions {
    /// Prefix of the two collections. Defaults to `fs`.
    pub bucket_name: Option<String>,
    /// Size of each chunk in bytes.
    pub chunk_size_bytes: Option<u32>,
    /// Write concern for uploads and deletes.
    pub write_concern: Option<WriteConcern>,
    /// Read concern for downloads.
    pub read_concern: Option<ReadConcern>,
    /// Read preference for downloads.
    pub read_preference: Option<ReadPreference>,
}

impl GridFsBucketOptions {
    /// Create a builder.
    pub fn builder() -> GridFsBucketOptionsBuilder {
        GridFsBucketOptionsBuilder::default()
    }
}

/// Builder for GridFsBucketOptions.
#[derive(Debug, Clone, Default)]
pub struct GridFsBucketOptionsBuilder {
    options: GridFsBucketOptions,
}

impl GridFsBucketOptionsBuilder {
    /// Set the bucket name.
    pub fn bucket_name(mut self, name: impl Into<String>) -> Self {
        self.options.bucket_name = Some(name.into());
        self
    }

    /// Set the chunk size.
    pub fn chunk_size_bytes(mut self, size: u32) -> Self {
        self.options.chunk_size_bytes = Some(size);
        self
    }

    /// Set the write concern.
    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    /// Set the read concern.
    pub fn read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.options.read_concern = Some(read_concern);
        self
    }

    /// Set the read preference.
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.options.read_preference = Some(read_preference);
        self
    }

    /// Build the options.
    pub fn build(self) -> GridFsBucketOptions {
        self.options
    }
}

/// Options for [`GridFsBucket::put`].
#[derive(Debug, Clone, Default)]
pub struct GridFsPutOptions {
    /// Stored file name.
    pub filename: Option<String>,
    /// Explicit file id; a fresh `ObjectId` otherwise.
    pub file_id: Option<Bson>,
    /// User metadata stored on the files document.
    pub metadata: Option<Document>,
}

/// Result of [`GridFsBucket::put`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridFsPutResult {
    /// Id of the stored file.
    pub file_id: Bson,
}

/// A document of the `files` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFsFile {
    /// File id.
    #[serde(rename = "_id")]
    pub id: Bson,
    /// Length in bytes.
    pub length: i64,
    /// Chunk size used when the file was written.
    #[serde(rename = "chunkSize")]
    pub chunk_size_bytes: i32,
    /// Upload time.
    #[serde(rename = "uploadDate")]
    pub upload_date: bson::DateTime,
    /// File name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}

/// A GridFS bucket.
///
/// # Example
///
/// ```ignore
/// let bucket = db.gridfs_bucket(GridFsBucketOptions::builder().bucket_name("files").build());
///
/// let put = bucket
///     .put(b"file content", GridFsPutOptions { filename: Some("a.txt".into()), ..Default::default() })
///     .await?;
/// let data = bucket.get_by_id(put.file_id.clone()).await?;
/// bucket.delete(put.file_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct GridFsBucket {
    files: Collection<Document>,
    chunks: Collection<Document>,
    chunk_size: u32,
    indexes_ready: Arc<AtomicBool>,
}

impl GridFsBucket {
    pub(crate) fn new(db: Database, options: GridFsBucketOptions) -> Self {
        let bucket_name = options
            .bucket_name
            .unwrap_or_else(|| DEFAULT_BUCKET_NAME.to_string());
        let mut codec_options = db.codec().options().clone();
        codec_options.key_case = KeyCase::Preserve;
        let collection_options = CollectionOptions {
            read_concern: options.read_concern,
            write_concern: options.write_concern,
            read_preference: options.read_preference,
            codec_options: Some(codec_options),
        };

        let files = format!("{}.files", bucket_name);
        let chunks = format!("{}.chunks", bucket_name);

        Self {
            files: db.collection_with_options(&files, collection_options.clone()),
            chunks: db.collection_with_options(&chunks, collection_options),
            chunk_size: options
                .chunk_size_bytes
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            indexes_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The `files` collection.
    pub fn files(&self) -> &Collection<Document> {
        &self.files
    }

    /// The `chunks` collection.
    pub fn chunks(&self) -> &Collection<Document> {
        &self.chunks
    }

    /// Chunk size for new uploads.
    pub fn chunk_size_bytes(&self) -> u32 {
        self.chunk_size
    }

    async fn ensure_indexes(&self) -> Result<()> {
        if self.indexes_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.files
            .create_indexes(
                vec![IndexModel::new(vec![("filename", 1), ("uploadDate", 1)])],
                None,
            )
            .await?;
        self.chunks
            .create_indexes(
                vec![IndexModel::new(vec![("files_id", 1), ("n", 1)]).with_options(IndexOptions {
                    unique: Some(true),
                    ..Default::default()
                })],
                None,
            )
            .await?;
        self.indexes_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Store `data` as a new file.
    ///
    /// Fails with [`MongoError::FileExists`] when the id is already taken.
    pub async fn put(
        &self,
        data: impl AsRef<[u8]>,
        options: impl Into<Option<GridFsPutOptions>>,
    ) -> Result<GridFsPutResult> {
        self.put_common(data.as_ref(), options.into(), None).await
    }

    /// Store `data` as a new file under a session.
    pub async fn put_with_session(
        &self,
        data: impl AsRef<[u8]>,
        options: impl Into<Option<GridFsPutOptions>>,
        session: &ClientSession,
    ) -> Result<GridFsPutResult> {
        self.put_common(data.as_ref(), options.into(), Some(session))
            .await
    }

    async fn put_common(
        &self,
        data: &[u8],
        options: Option<GridFsPutOptions>,
        session: Option<&ClientSession>,
    ) -> Result<GridFsPutResult> {
        let options = options.unwrap_or_default();
        let file_id = options
            .file_id
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

        self.ensure_indexes().await?;
        if self
            .files
            .find_one_common(Some(doc! { "_id": file_id.clone() }), None, session)
            .await?
            .is_some()
        {
            return Err(MongoError::FileExists(format!("file id {} already exists", file_id)));
        }

        let chunk_ids: Vec<Bson> = data
            .chunks(self.chunk_size as usize)
            .map(|_| Bson::ObjectId(ObjectId::new()))
            .collect();
        let chunks: Vec<Document> = data
            .chunks(self.chunk_size as usize)
            .zip(&chunk_ids)
            .enumerate()
            .map(|(n, (bytes, id))| {
                let n = n as i32;
                let data = Binary {
                    subtype: BinarySubtype::Generic,
                    bytes: bytes.to_vec(),
                };
                doc! {
                    "_id": id.clone(),
                    "files_id": file_id.clone(),
                    "n": n,
                    "data": data,
                }
            })
            .collect();
        debug!(file_id = %file_id, length = data.len(), chunks = chunks.len(), "gridfs put");

        if !chunks.is_empty() {
            if let Err(e) = self.chunks.insert_many_common(chunks, None, session).await {
                self.remove_chunks(&chunk_ids, session).await;
                return Err(exists_or(e, &file_id));
            }
        }

        let length = data.len() as i64;
        let chunk_size = self.chunk_size as i32;
        let mut file = doc! {
            "_id": file_id.clone(),
            "length": length,
            "chunkSize": chunk_size,
            "uploadDate": bson::DateTime::now(),
        };
        if let Some(filename) = options.filename {
            file.insert("filename", filename);
        }
        if let Some(metadata) = options.metadata {
            file.insert("metadata", metadata);
        }

        if let Err(e) = self.files.insert_one_common(file, None, session).await {
            self.remove_chunks(&chunk_ids, session).await;
            return Err(exists_or(e, &file_id));
        }
        Ok(GridFsPutResult { file_id })
    }

    async fn remove_chunks(&self, chunk_ids: &[Bson], session: Option<&ClientSession>) {
        if chunk_ids.is_empty() {
            return;
        }
        let filter = doc! { "_id": { "$in": chunk_ids.to_vec() } };
        if let Err(e) = self.chunks.delete_common(filter, None, true, session).await {
            warn!(error = %e, "failed to remove chunks of an aborted upload");
        }
    }

    /// Read a whole file by id.
    pub async fn get_by_id(&self, file_id: impl Into<Bson>) -> Result<Vec<u8>> {
        self.get_by_id_common(file_id.into(), None).await
    }

    /// Read a whole file by id under a session.
    pub async fn get_by_id_with_session(
        &self,
        file_id: impl Into<Bson>,
        session: &ClientSession,
    ) -> Result<Vec<u8>> {
        self.get_by_id_common(file_id.into(), Some(session)).await
    }

    async fn get_by_id_common(
        &self,
        file_id: Bson,
        session: Option<&ClientSession>,
    ) -> Result<Vec<u8>> {
        let file = self
            .files
            .find_one_common(Some(doc! { "_id": file_id.clone() }), None, session)
            .await?
            .ok_or_else(|| MongoError::NoFile(format!("no file with id {}", file_id)))?;
        self.read_file(file, session).await
    }

    /// Read the newest revision of a file by name.
    pub async fn get_by_name(&self, filename: &str) -> Result<Vec<u8>> {
        self.get_by_name_common(filename, None).await
    }

    /// Read the newest revision of a file by name under a session.
    pub async fn get_by_name_with_session(
        &self,
        filename: &str,
        session: &ClientSession,
    ) -> Result<Vec<u8>> {
        self.get_by_name_common(filename, Some(session)).await
    }

    async fn get_by_name_common(
        &self,
        filename: &str,
        session: Option<&ClientSession>,
    ) -> Result<Vec<u8>> {
        let options = FindOneOptions {
            sort: Some(doc! { "uploadDate": -1 }),
            ..Default::default()
        };
        let file = self
            .files
            .find_one_common(Some(doc! { "filename": filename }), Some(options), session)
            .await?
            .ok_or_else(|| MongoError::NoFile(format!("no file named {}", filename)))?;
        self.read_file(file, session).await
    }

    async fn read_file(&self, file: Document, session: Option<&ClientSession>) -> Result<Vec<u8>> {
        let file: GridFsFile = bson::from_document(file)?;
        let length = usize::try_from(file.length)
            .map_err(|_| MongoError::GridFs(format!("file {} has a negative length", file.id)))?;
        if length == 0 {
            return Ok(Vec::new());
        }
        let chunk_size = usize::try_from(file.chunk_size_bytes)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| MongoError::GridFs(format!("file {} has an invalid chunk size", file.id)))?;
        let expected_chunks = (length + chunk_size - 1) / chunk_size;

        let options = FindOptions::builder().sort(doc! { "n": 1 }).build();
        let mut cursor = self
            .chunks
            .find_common(Some(doc! { "files_id": file.id.clone() }), Some(options), session)
            .await?;

        let mut data = Vec::with_capacity(length);
        let mut expected_n = 0usize;
        while let Some(chunk) = cursor.try_next().await? {
            let n = chunk.get("n").and_then(crate::error::bson_to_i64);
            if n != Some(expected_n as i64) {
                return Err(MongoError::GridFs(format!(
                    "file {}: expected chunk {} but found {:?}",
                    file.id, expected_n, n
                )));
            }
            let bytes = chunk.get_binary_generic("data").map_err(|_| {
                MongoError::GridFs(format!("file {}: chunk {} has no data", file.id, expected_n))
            })?;
            let expected_len = if expected_n + 1 == expected_chunks {
                length - chunk_size * expected_n
            } else {
                chunk_size
            };
            if expected_n >= expected_chunks || bytes.len() != expected_len {
                return Err(MongoError::GridFs(format!(
                    "file {}: chunk {} has {} bytes, expected {}",
                    file.id,
                    expected_n,
                    bytes.len(),
                    expected_len
                )));
            }
            data.extend_from_slice(bytes);
            expected_n += 1;
        }

        if expected_n != expected_chunks {
            return Err(MongoError::GridFs(format!(
                "file {}: found {} of {} chunks",
                file.id, expected_n, expected_chunks
            )));
        }
        Ok(data)
    }

    /// Delete a file and its chunks.
    ///
    /// Fails with [`MongoError::NoFile`] when the id is unknown; orphaned
    /// chunks are removed either way.
    pub async fn delete(&self, file_id: impl Into<Bson>) -> Result<()> {
        self.delete_common(file_id.into(), None).await
    }

    /// Delete a file and its chunks under a session.
    pub async fn delete_with_session(
        &self,
        file_id: impl Into<Bson>,
        session: &ClientSession,
    ) -> Result<()> {
        self.delete_common(file_id.into(), Some(session)).await
    }

    async fn delete_common(&self, file_id: Bson, session: Option<&ClientSession>) -> Result<()> {
        let deleted = self
            .files
            .delete_common(doc! { "_id": file_id.clone() }, None, false, session)
            .await?;
        self.chunks
            .delete_common(doc! { "files_id": file_id.clone() }, None, true, session)
            .await?;
        if deleted.deleted_count == 0 {
            return Err(MongoError::NoFile(format!("no file with id {}", file_id)));
        }
        Ok(())
    }

    /// List files documents matching `filter`.
    pub async fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<GridFsFile>> {
        self.files
            .clone_with_type::<GridFsFile>()
            .find_many(filter, options)
            .await
    }

    /// Drop both collections of the bucket.
    pub async fn drop(&self) -> Result<()> {
        self.files.drop(None).await?;
        self.chunks.drop(None).await?;
        self.indexes_ready.store(false, Ordering::Release);
        Ok(())
    }
}

/// Duplicate keys on upload mean the id is taken.
fn exists_or(error: MongoError, file_id: &Bson) -> MongoError {
    if error.is_duplicate_key() {
        MongoError::FileExists(format!("file id {} already exists", file_id))
    } else {
        error
    }
}
