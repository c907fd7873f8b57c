//! Error types for MongoDB operations.
//!
//! Server replies are classified by their numeric `code` and structured
//! fields (`writeErrors`, `writeConcernError`, `errorLabels`). Message text is
//! never inspected.

use bson::{Bson, Document};
use thiserror::Error;

/// Server error codes for unique index violations.
pub const DUPLICATE_KEY_CODES: [i32; 3] = [11000, 11001, 12582];

/// Server error codes for index name/key-pattern conflicts.
pub const INDEX_CONFLICT_CODES: [i32; 2] = [85, 86];

/// Server error codes reported when a write concern could not be satisfied.
pub const WRITE_CONCERN_CODES: [i32; 3] = [64, 79, 100];

/// `NamespaceNotFound`.
pub const NAMESPACE_NOT_FOUND: i32 = 26;

/// `MaxTimeMSExpired`.
pub const MAX_TIME_MS_EXPIRED: i32 = 50;

/// `CursorNotFound`.
pub const CURSOR_NOT_FOUND: i32 = 43;

/// Label attached to errors after which the whole transaction may be retried.
pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";

/// Label attached to commit errors whose outcome is unknown.
pub const UNKNOWN_TRANSACTION_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

/// A single failed write inside an insert/update/delete command.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// Position of the failed write in the submitted batch.
    pub index: usize,
    /// Server error code.
    pub code: i32,
    /// Server error message.
    pub message: String,
    /// Extra information, e.g. `keyValue` for duplicate keys.
    pub details: Option<Document>,
}

impl WriteFailure {
    fn from_document(doc: &Document) -> Self {
        Self {
            index: doc.get("index").and_then(bson_to_i64).unwrap_or(0) as usize,
            code: doc.get("code").and_then(bson_to_i64).unwrap_or(0) as i32,
            message: doc.get_str("errmsg").unwrap_or_default().to_string(),
            details: doc
                .get_document("keyValue")
                .or_else(|_| doc.get_document("errInfo"))
                .ok()
                .cloned(),
        }
    }

    /// Whether this failure is a unique index violation.
    pub fn is_duplicate_key(&self) -> bool {
        DUPLICATE_KEY_CODES.contains(&self.code)
    }
}

/// A write concern that the server could not satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcernFailure {
    /// Server error code.
    pub code: i32,
    /// Server error message.
    pub message: String,
    /// Error labels attached to the reply.
    pub labels: Vec<String>,
}

/// All errors that can occur during MongoDB operations.
#[derive(Debug, Error)]
pub enum MongoError {
    /// Malformed connection string or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Server selection error.
    #[error("server selection error: {0}")]
    ServerSelection(String),

    /// Generic server-side rejection of a command.
    #[error("command error {code} ({code_name}): {message}")]
    Command {
        /// Error code from server.
        code: i32,
        /// Symbolic code name from server.
        code_name: String,
        /// Error message.
        message: String,
        /// Error labels.
        labels: Vec<String>,
    },

    /// Unique index violation.
    #[error("duplicate key error: {}", .0.message)]
    DuplicateKey(WriteFailure),

    /// Write error.
    #[error("write error {}: {}", .0.code, .0.message)]
    Write(WriteFailure),

    /// Write concern error.
    #[error("write concern error {}: {}", .0.code, .0.message)]
    WriteConcern(WriteConcernFailure),

    /// Several writes of one batch failed.
    #[error("bulk write error: {} failed writes", failures.len())]
    BulkWrite {
        /// Individual failures, in batch order.
        failures: Vec<WriteFailure>,
        /// Write concern failure reported alongside, if any.
        write_concern: Option<WriteConcernFailure>,
        /// Number of writes that were applied.
        applied: u64,
    },

    /// Index name reused with a different definition.
    #[error("index conflict ({code}): {message}")]
    IndexConflict {
        /// Error code from server.
        code: i32,
        /// Error message.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid argument, detected before any network round trip.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid session or transaction state transition.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Cursor exhausted.
    #[error("cursor exhausted")]
    CursorExhausted,

    /// GridFS file lookup miss.
    #[error("no file: {0}")]
    NoFile(String),

    /// GridFS file id or name already taken.
    #[error("file exists: {0}")]
    FileExists(String),

    /// GridFS data corruption.
    #[error("gridfs error: {0}")]
    GridFs(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MongoError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        MongoError::Configuration(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        MongoError::Connection(msg.into())
    }

    /// Create a command error.
    pub fn command(code: i32, message: impl Into<String>) -> Self {
        MongoError::Command {
            code,
            code_name: String::new(),
            message: message.into(),
            labels: Vec::new(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        MongoError::InvalidArgument(msg.into())
    }

    /// Create a transaction state error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        MongoError::Transaction(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        MongoError::Internal(msg.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MongoError::Connection(_) | MongoError::ServerSelection(_)
        )
    }

    /// Check if this is a unique index violation, including one reported
    /// inside a bulk write.
    pub fn is_duplicate_key(&self) -> bool {
        self.kind() == ErrorKind::DuplicateKey
    }

    /// Check if the server gave up because `maxTimeMS` expired.
    pub fn is_timeout(&self) -> bool {
        self.code() == Some(MAX_TIME_MS_EXPIRED)
    }

    /// Check if the server reported a missing namespace.
    pub fn is_namespace_not_found(&self) -> bool {
        self.code() == Some(NAMESPACE_NOT_FOUND)
    }

    /// Get the error code if available.
    pub fn code(&self) -> Option<i32> {
        match self {
            MongoError::Command { code, .. } | MongoError::IndexConflict { code, .. } => {
                Some(*code)
            }
            MongoError::DuplicateKey(failure) | MongoError::Write(failure) => Some(failure.code),
            MongoError::WriteConcern(failure) => Some(failure.code),
            MongoError::BulkWrite { failures, .. } => failures.first().map(|f| f.code),
            _ => None,
        }
    }

    /// Error labels attached by the server.
    pub fn labels(&self) -> &[String] {
        match self {
            MongoError::Command { labels, .. } => labels,
            MongoError::WriteConcern(failure) => &failure.labels,
            MongoError::BulkWrite {
                write_concern: Some(failure),
                ..
            } => &failure.labels,
            _ => &[],
        }
    }

    /// Check whether the server attached `label` to this error.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels().iter().any(|l| l == label)
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MongoError::Configuration(_) => ErrorKind::Configuration,
            MongoError::Connection(_) => ErrorKind::Connection,
            MongoError::ServerSelection(_) => ErrorKind::ServerSelection,
            MongoError::Command { .. } => ErrorKind::OperationFailure,
            MongoError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            MongoError::Write(_) => ErrorKind::Write,
            MongoError::WriteConcern(_) => ErrorKind::WriteConcern,
            MongoError::BulkWrite {
                failures,
                write_concern,
                ..
            } => match failures.first() {
                Some(failure) if failure.is_duplicate_key() => ErrorKind::DuplicateKey,
                Some(_) => ErrorKind::Write,
                None if write_concern.is_some() => ErrorKind::WriteConcern,
                None => ErrorKind::Write,
            },
            MongoError::IndexConflict { .. } => ErrorKind::IndexConflict,
            MongoError::Serialization(_) | MongoError::Deserialization(_) => {
                ErrorKind::Serialization
            }
            MongoError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MongoError::Transaction(_) => ErrorKind::Transaction,
            MongoError::CursorExhausted => ErrorKind::CursorExhausted,
            MongoError::NoFile(_) => ErrorKind::NoFile,
            MongoError::FileExists(_) => ErrorKind::FileExists,
            MongoError::GridFs(_) => ErrorKind::GridFs,
            MongoError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Collapse write failures into one error: a lone failure keeps its own
    /// kind, anything more becomes `BulkWrite`.
    pub(crate) fn from_write_failures(
        mut failures: Vec<WriteFailure>,
        write_concern: Option<WriteConcernFailure>,
        applied: u64,
    ) -> Self {
        match (failures.len(), write_concern) {
            (0, Some(wce)) => MongoError::WriteConcern(wce),
            (1, None) => {
                let failure = failures.swap_remove(0);
                if failure.is_duplicate_key() {
                    MongoError::DuplicateKey(failure)
                } else {
                    MongoError::Write(failure)
                }
            }
            (_, write_concern) => MongoError::BulkWrite {
                failures,
                write_concern,
                applied,
            },
        }
    }

    /// Split a write error back into its failures. Errors that are not
    /// write failures are handed back unchanged.
    pub(crate) fn into_write_failures(
        self,
    ) -> std::result::Result<(Vec<WriteFailure>, Option<WriteConcernFailure>), MongoError> {
        match self {
            MongoError::DuplicateKey(failure) | MongoError::Write(failure) => {
                Ok((vec![failure], None))
            }
            MongoError::WriteConcern(wce) => Ok((Vec::new(), Some(wce))),
            MongoError::BulkWrite {
                failures,
                write_concern,
                ..
            } => Ok((failures, write_concern)),
            other => Err(other),
        }
    }

    /// Build an error from a failed reply's `code`, `codeName`, `errmsg` and
    /// `errorLabels`.
    pub(crate) fn from_server(
        code: i32,
        code_name: String,
        message: String,
        labels: Vec<String>,
    ) -> Self {
        if DUPLICATE_KEY_CODES.contains(&code) {
            MongoError::DuplicateKey(WriteFailure {
                index: 0,
                code,
                message,
                details: None,
            })
        } else if INDEX_CONFLICT_CODES.contains(&code) {
            MongoError::IndexConflict { code, message }
        } else if WRITE_CONCERN_CODES.contains(&code) {
            MongoError::WriteConcern(WriteConcernFailure {
                code,
                message,
                labels,
            })
        } else {
            MongoError::Command {
                code,
                code_name,
                message,
                labels,
            }
        }
    }
}

impl From<serde_json::Error> for MongoError {
    fn from(err: serde_json::Error) -> Self {
        MongoError::Serialization(err.to_string())
    }
}

impl From<bson::ser::Error> for MongoError {
    fn from(err: bson::ser::Error) -> Self {
        MongoError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for MongoError {
    fn from(err: bson::de::Error) -> Self {
        MongoError::Deserialization(err.to_string())
    }
}

impl From<bson::raw::Error> for MongoError {
    fn from(err: bson::raw::Error) -> Self {
        MongoError::Deserialization(err.to_string())
    }
}

impl From<mongodb::error::Error> for MongoError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind as DriverKind;

        let labels: Vec<String> = err.labels().iter().cloned().collect();
        match err.kind.as_ref() {
            DriverKind::Command(cmd) => MongoError::from_server(
                cmd.code,
                cmd.code_name.clone(),
                cmd.message.clone(),
                labels,
            ),
            DriverKind::ServerSelection { message, .. } => {
                MongoError::ServerSelection(message.clone())
            }
            DriverKind::InvalidArgument { message, .. } => {
                MongoError::InvalidArgument(message.clone())
            }
            DriverKind::Authentication { message, .. } => {
                MongoError::Configuration(format!("authentication failed: {}", message))
            }
            DriverKind::Io(io) => MongoError::Connection(io.to_string()),
            DriverKind::BsonSerialization(e) => MongoError::Serialization(e.to_string()),
            DriverKind::BsonDeserialization(e) => MongoError::Deserialization(e.to_string()),
            _ => MongoError::Internal(err.to_string()),
        }
    }
}

/// Result type alias for MongoDB operations.
pub type Result<T> = std::result::Result<T, MongoError>;

/// Error kind enumeration for pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration error.
    Configuration,
    /// Connection error.
    Connection,
    /// No server available within the selection timeout.
    ServerSelection,
    /// Generic server-side rejection.
    OperationFailure,
    /// Unique index violation.
    DuplicateKey,
    /// Write error.
    Write,
    /// Write concern error.
    WriteConcern,
    /// Index definition conflict.
    IndexConflict,
    /// Serialization error.
    Serialization,
    /// GridFS lookup miss.
    NoFile,
    /// GridFS duplicate file.
    FileExists,
    /// GridFS data error.
    GridFs,
    /// Local misuse.
    InvalidArgument,
    /// Session state error.
    Transaction,
    /// Cursor has nothing buffered.
    CursorExhausted,
    /// Internal error.
    Internal,
}

/// Validate a command reply.
///
/// `ok: 0` replies become the matching error kind. Acknowledged write replies
/// that still carry `writeErrors` or `writeConcernError` fail as well.
pub(crate) fn check_reply(reply: Document) -> Result<Document> {
    let ok = reply.get("ok").and_then(bson_to_f64).unwrap_or(0.0);
    if ok < 1.0 {
        return Err(MongoError::from_server(
            reply.get("code").and_then(bson_to_i64).unwrap_or(0) as i32,
            reply.get_str("codeName").unwrap_or_default().to_string(),
            reply.get_str("errmsg").unwrap_or_default().to_string(),
            labels_of(&reply),
        ));
    }

    let failures: Vec<WriteFailure> = reply
        .get_array("writeErrors")
        .map(|errors| {
            errors
                .iter()
                .filter_map(Bson::as_document)
                .map(WriteFailure::from_document)
                .collect()
        })
        .unwrap_or_default();

    let write_concern = reply
        .get_document("writeConcernError")
        .ok()
        .map(|wce| WriteConcernFailure {
            code: wce.get("code").and_then(bson_to_i64).unwrap_or(0) as i32,
            message: wce.get_str("errmsg").unwrap_or_default().to_string(),
            labels: labels_of(&reply),
        });

    if failures.is_empty() && write_concern.is_none() {
        return Ok(reply);
    }
    let applied = reply.get("n").and_then(bson_to_i64).unwrap_or(0) as u64;
    Err(MongoError::from_write_failures(failures, write_concern, applied))
}

fn labels_of(reply: &Document) -> Vec<String> {
    reply
        .get_array("errorLabels")
        .map(|labels| {
            labels
                .iter()
                .filter_map(Bson::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Read any numeric BSON value as `i64`.
pub(crate) fn bson_to_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        Bson::Boolean(v) => Some(i64::from(*v)),
        _ => None,
    }
}

/// Read any numeric BSON value as `f64`.
pub(crate) fn bson_to_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}
