//! Option types shared across clients, databases, collections and sessions.
//!
//! Concerns and read preferences are inherited client -> database ->
//! collection, and an operation-level value always wins.

use crate::codec::CodecOptions;
use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

// ============================================================================
// Read/write concerns and read preference
// ============================================================================

/// Isolation level of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadConcernLevel {
    /// `local`.
    Local,
    /// `majority`.
    Majority,
    /// `linearizable`.
    Linearizable,
    /// `available`.
    Available,
    /// `snapshot`.
    Snapshot,
    /// Any other level understood by the server.
    Custom(String),
}

impl ReadConcernLevel {
    /// Parse a level name.
    pub fn from_str(level: &str) -> Self {
        match level {
            "local" => ReadConcernLevel::Local,
            "majority" => ReadConcernLevel::Majority,
            "linearizable" => ReadConcernLevel::Linearizable,
            "available" => ReadConcernLevel::Available,
            "snapshot" => ReadConcernLevel::Snapshot,
            other => ReadConcernLevel::Custom(other.to_string()),
        }
    }

    /// The wire name.
    pub fn as_str(&self) -> &str {
        match self {
            ReadConcernLevel::Local => "local",
            ReadConcernLevel::Majority => "majority",
            ReadConcernLevel::Linearizable => "linearizable",
            ReadConcernLevel::Available => "available",
            ReadConcernLevel::Snapshot => "snapshot",
            ReadConcernLevel::Custom(level) => level,
        }
    }
}

/// Read concern attached to reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConcern {
    /// Requested level.
    pub level: ReadConcernLevel,
}

impl ReadConcern {
    /// `{level: "local"}`.
    pub fn local() -> Self {
        Self {
            level: ReadConcernLevel::Local,
        }
    }

    /// `{level: "majority"}`.
    pub fn majority() -> Self {
        Self {
            level: ReadConcernLevel::Majority,
        }
    }

    /// `{level: "snapshot"}`.
    pub fn snapshot() -> Self {
        Self {
            level: ReadConcernLevel::Snapshot,
        }
    }

    /// The `readConcern` sub-document.
    pub fn to_document(&self) -> Document {
        doc! { "level": self.level.as_str() }
    }
}

/// The `w` component of a write concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Wait for this many members.
    Nodes(u32),
    /// Wait for a majority of voting members.
    Majority,
    /// A custom tag set name.
    Custom(String),
}

impl Acknowledgment {
    fn to_bson(&self) -> Bson {
        match self {
            Acknowledgment::Nodes(n) => Bson::Int32(*n as i32),
            Acknowledgment::Majority => Bson::String("majority".to_string()),
            Acknowledgment::Custom(tag) => Bson::String(tag.clone()),
        }
    }
}

/// Write concern attached to writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteConcern {
    /// Acknowledgment level.
    pub w: Option<Acknowledgment>,
    /// Replication timeout in milliseconds.
    pub w_timeout_ms: Option<u64>,
    /// Wait for the journal.
    pub journal: Option<bool>,
}

impl WriteConcern {
    /// `{w: "majority"}`.
    pub fn majority() -> Self {
        Self {
            w: Some(Acknowledgment::Majority),
            ..Default::default()
        }
    }

    /// `{w: n}`.
    pub fn nodes(n: u32) -> Self {
        Self {
            w: Some(Acknowledgment::Nodes(n)),
            ..Default::default()
        }
    }

    /// Whether the server replies with a write result.
    pub fn is_acknowledged(&self) -> bool {
        self.w != Some(Acknowledgment::Nodes(0)) || self.journal == Some(true)
    }

    /// The `writeConcern` sub-document.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(ref w) = self.w {
            doc.insert("w", w.to_bson());
        }
        if let Some(timeout) = self.w_timeout_ms {
            doc.insert("wtimeout", timeout as i64);
        }
        if let Some(journal) = self.journal {
            doc.insert("j", journal);
        }
        doc
    }
}

/// Server role a read is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreferenceMode {
    /// Primary only.
    #[default]
    Primary,
    /// Primary when available.
    PrimaryPreferred,
    /// Secondaries only.
    Secondary,
    /// Secondaries when available.
    SecondaryPreferred,
    /// Lowest latency member.
    Nearest,
}

impl ReadPreferenceMode {
    /// Parse a mode name as written in connection strings.
    pub fn from_str(mode: &str) -> Option<Self> {
        match mode {
            "primary" => Some(ReadPreferenceMode::Primary),
            "primaryPreferred" => Some(ReadPreferenceMode::PrimaryPreferred),
            "secondary" => Some(ReadPreferenceMode::Secondary),
            "secondaryPreferred" => Some(ReadPreferenceMode::SecondaryPreferred),
            "nearest" => Some(ReadPreferenceMode::Nearest),
            _ => None,
        }
    }

    /// The wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreferenceMode::Primary => "primary",
            ReadPreferenceMode::PrimaryPreferred => "primaryPreferred",
            ReadPreferenceMode::Secondary => "secondary",
            ReadPreferenceMode::SecondaryPreferred => "secondaryPreferred",
            ReadPreferenceMode::Nearest => "nearest",
        }
    }
}

/// Where reads are routed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadPreference {
    /// Server role.
    pub mode: ReadPreferenceMode,
    /// Ordered tag sets, each a map of tag name to value.
    pub tag_sets: Option<Vec<Document>>,
    /// Maximum replication lag in seconds.
    pub max_staleness_secs: Option<u64>,
}

impl ReadPreference {
    /// Read preference for a mode without tags.
    pub fn new(mode: ReadPreferenceMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// `primary`.
    pub fn primary() -> Self {
        Self::new(ReadPreferenceMode::Primary)
    }

    /// `secondaryPreferred`.
    pub fn secondary_preferred() -> Self {
        Self::new(ReadPreferenceMode::SecondaryPreferred)
    }

    /// `nearest`.
    pub fn nearest() -> Self {
        Self::new(ReadPreferenceMode::Nearest)
    }

    /// Whether this preference routes to the primary only.
    pub fn is_primary(&self) -> bool {
        self.mode == ReadPreferenceMode::Primary
    }
}

/// Language-sensitive string comparison rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collation {
    /// ICU locale.
    pub locale: String,
    /// Consider case at strength 1 or 2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_level: Option<bool>,
    /// `upper`, `lower` or `off`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_first: Option<String>,
    /// Comparison level, 1 to 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<i32>,
    /// Compare numeric strings as numbers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_ordering: Option<bool>,
    /// `non-ignorable` or `shifted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    /// `punct` or `space`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_variable: Option<String>,
    /// Check whether text requires normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization: Option<bool>,
    /// Sort secondary differences from the back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backwards: Option<bool>,
}

impl Collation {
    /// Collation for a locale with server defaults.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Default::default()
        }
    }

    pub(crate) fn to_document(&self) -> crate::Result<Document> {
        Ok(bson::to_document(self)?)
    }
}

/// Index hint.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// Key pattern.
    Keys(Document),
    /// Index name.
    Name(String),
}

impl Hint {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            Hint::Keys(keys) => Bson::Document(keys.clone()),
            Hint::Name(name) => Bson::String(name.clone()),
        }
    }
}

impl From<&str> for Hint {
    fn from(name: &str) -> Self {
        Hint::Name(name.to_string())
    }
}

impl From<Document> for Hint {
    fn from(keys: Document) -> Self {
        Hint::Keys(keys)
    }
}

/// Cursor lifetime behavior for `find`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    /// Close once results are exhausted.
    #[default]
    NonTailable,
    /// Stay open on capped collections after the last result.
    Tailable,
    /// Tailable, and `getMore` blocks on the server for new data.
    TailableAwait,
}

/// Which version of a document `findAndModify` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    /// The document as it was before the modification.
    #[default]
    Before,
    /// The modified document.
    After,
}

// ============================================================================
// Handle options
// ============================================================================

/// Overrides applied when obtaining a database handle.
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Codec options.
    pub codec_options: Option<CodecOptions>,
}

/// Overrides applied when obtaining a collection handle.
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Codec options.
    pub codec_options: Option<CodecOptions>,
}

/// Options for starting a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Make reads observe this session's previous writes (default true).
    pub causal_consistency: Option<bool>,
    /// Read from a point-in-time snapshot.
    pub snapshot: Option<bool>,
    /// Defaults for transactions started on the session.
    pub default_transaction_options: Option<TransactionOptions>,
}

/// Options for one transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Read concern of the whole transaction.
    pub read_concern: Option<ReadConcern>,
    /// Write concern applied at commit.
    pub write_concern: Option<WriteConcern>,
    /// Read preference of the whole transaction.
    pub read_preference: Option<ReadPreference>,
    /// Server time limit for the commit.
    pub max_commit_time_ms: Option<u64>,
}

impl TransactionOptions {
    /// Create a builder.
    pub fn builder() -> TransactionOptionsBuilder {
        TransactionOptionsBuilder::default()
    }

    /// Fill unset fields from `defaults`.
    pub(crate) fn merged_with(self, defaults: Option<&TransactionOptions>) -> Self {
        let Some(defaults) = defaults else {
            return self;
        };
        Self {
            read_concern: self.read_concern.or_else(|| defaults.read_concern.clone()),
            write_concern: self.write_concern.or_else(|| defaults.write_concern.clone()),
            read_preference: self
                .read_preference
                .or_else(|| defaults.read_preference.clone()),
            max_commit_time_ms: self.max_commit_time_ms.or(defaults.max_commit_time_ms),
        }
    }
}

/// Builder for TransactionOptions.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptionsBuilder {
    options: TransactionOptions,
}

impl TransactionOptionsBuilder {
    /// Set the read concern.
    pub fn read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.options.read_concern = Some(read_concern);
        self
    }

    /// Set the write concern.
    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    /// Set the read preference.
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.options.read_preference = Some(read_preference);
        self
    }

    /// Set the commit time limit.
    pub fn max_commit_time_ms(mut self, ms: u64) -> Self {
        self.options.max_commit_time_ms = Some(ms);
        self
    }

    /// Build the options.
    pub fn build(self) -> TransactionOptions {
        self.options
    }
}

// ============================================================================
// Read operation options
// ============================================================================

/// Options for find operations.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Allow blocking sorts to spill to disk.
    pub allow_disk_use: Option<bool>,
    /// Return partial results when shards are down.
    pub allow_partial_results: Option<bool>,
    /// Documents per batch.
    pub batch_size: Option<u32>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Cursor type.
    pub cursor_type: Option<CursorType>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Maximum number of documents to return. Negative means a single batch.
    pub limit: Option<i64>,
    /// Exclusive upper index bound.
    pub max: Option<Document>,
    /// `getMore` wait time for tailable-await cursors.
    pub max_await_time_ms: Option<u64>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Inclusive lower index bound.
    pub min: Option<Document>,
    /// Disable the idle cursor timeout.
    pub no_cursor_timeout: Option<bool>,
    /// Projection (fields to include/exclude).
    pub projection: Option<Document>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Return only index keys.
    pub return_key: Option<bool>,
    /// Add `$recordId` to results.
    pub show_record_id: Option<bool>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Sort order.
    pub sort: Option<Document>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

impl FindOptions {
    /// Create new find options.
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }
}

/// Builder for FindOptions.
#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    /// Set the limit.
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Set the skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Set the sort order.
    pub fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    /// Set the projection.
    pub fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    /// Set the cursor type.
    pub fn cursor_type(mut self, cursor_type: CursorType) -> Self {
        self.options.cursor_type = Some(cursor_type);
        self
    }

    /// Set the index hint.
    pub fn hint(mut self, hint: impl Into<Hint>) -> Self {
        self.options.hint = Some(hint.into());
        self
    }

    /// Set the collation.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// Set the server time limit.
    pub fn max_time_ms(mut self, ms: u64) -> Self {
        self.options.max_time_ms = Some(ms);
        self
    }

    /// Set the await time for tailable-await cursors.
    pub fn max_await_time_ms(mut self, ms: u64) -> Self {
        self.options.max_await_time_ms = Some(ms);
        self
    }

    /// Set the comment.
    pub fn comment(mut self, comment: impl Into<Bson>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Set the read preference.
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.options.read_preference = Some(read_preference);
        self
    }

    /// Set the read concern.
    pub fn read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.options.read_concern = Some(read_concern);
        self
    }

    /// Allow disk use for blocking stages.
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.options.allow_disk_use = Some(allow);
        self
    }

    /// Disable the idle cursor timeout.
    pub fn no_cursor_timeout(mut self, no_timeout: bool) -> Self {
        self.options.no_cursor_timeout = Some(no_timeout);
        self
    }

    /// Build the options.
    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Options for `find_one`.
#[derive(Debug, Clone, Default)]
pub struct FindOneOptions {
    /// Return partial results when shards are down.
    pub allow_partial_results: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Exclusive upper index bound.
    pub max: Option<Document>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Inclusive lower index bound.
    pub min: Option<Document>,
    /// Projection.
    pub projection: Option<Document>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Return only index keys.
    pub return_key: Option<bool>,
    /// Add `$recordId` to results.
    pub show_record_id: Option<bool>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Sort order.
    pub sort: Option<Document>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

impl From<FindOneOptions> for FindOptions {
    fn from(options: FindOneOptions) -> Self {
        FindOptions {
            allow_partial_results: options.allow_partial_results,
            collation: options.collation,
            comment: options.comment,
            hint: options.hint,
            limit: Some(-1),
            max: options.max,
            max_time_ms: options.max_time_ms,
            min: options.min,
            projection: options.projection,
            read_concern: options.read_concern,
            read_preference: options.read_preference,
            return_key: options.return_key,
            show_record_id: options.show_record_id,
            skip: options.skip,
            sort: options.sort,
            let_vars: options.let_vars,
            ..Default::default()
        }
    }
}

/// Options for aggregation.
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    /// Allow stages to spill to disk.
    pub allow_disk_use: Option<bool>,
    /// Documents per batch.
    pub batch_size: Option<u32>,
    /// Skip schema validation for `$out`/`$merge`.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// `getMore` wait time for change-stream style cursors.
    pub max_await_time_ms: Option<u64>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Write concern for `$out`/`$merge`.
    pub write_concern: Option<WriteConcern>,
    /// Pipeline variables.
    pub let_vars: Option<Document>,
}

/// Options for `count_documents`.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Maximum number of documents to count.
    pub limit: Option<u64>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Number of documents to skip before counting.
    pub skip: Option<u64>,
}

/// Options for `estimated_document_count`.
#[derive(Debug, Clone, Default)]
pub struct EstimatedDocumentCountOptions {
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
}

/// Options for `distinct`.
#[derive(Debug, Clone, Default)]
pub struct DistinctOptions {
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
}

// ============================================================================
// Write operation options
// ============================================================================

/// Options for `insert_one`.
#[derive(Debug, Clone, Default)]
pub struct InsertOneOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

/// Options for `insert_many`.
#[derive(Debug, Clone, Default)]
pub struct InsertManyOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Stop at the first failure (default true).
    pub ordered: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

/// Options for update operations.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Array filters for updating nested arrays.
    pub array_filters: Option<Vec<Document>>,
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Whether to insert if no documents match.
    pub upsert: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

impl UpdateOptions {
    /// Create a builder.
    pub fn builder() -> UpdateOptionsBuilder {
        UpdateOptionsBuilder::default()
    }
}

/// Builder for UpdateOptions.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptionsBuilder {
    options: UpdateOptions,
}

impl UpdateOptionsBuilder {
    /// Set upsert option.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.options.upsert = Some(upsert);
        self
    }

    /// Set array filters.
    pub fn array_filters(mut self, filters: Vec<Document>) -> Self {
        self.options.array_filters = Some(filters);
        self
    }

    /// Set the collation.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// Set the index hint.
    pub fn hint(mut self, hint: impl Into<Hint>) -> Self {
        self.options.hint = Some(hint.into());
        self
    }

    /// Set the write concern.
    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    /// Build the options.
    pub fn build(self) -> UpdateOptions {
        self.options
    }
}

/// Options for `replace_one`.
#[derive(Debug, Clone, Default)]
pub struct ReplaceOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Whether to insert if no documents match.
    pub upsert: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

impl From<ReplaceOptions> for UpdateOptions {
    fn from(options: ReplaceOptions) -> Self {
        UpdateOptions {
            array_filters: None,
            bypass_document_validation: options.bypass_document_validation,
            collation: options.collation,
            comment: options.comment,
            hint: options.hint,
            upsert: options.upsert,
            write_concern: options.write_concern,
            let_vars: options.let_vars,
        }
    }
}

/// Options for delete operations.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

/// Options for `find_one_and_update`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndUpdateOptions {
    /// Array filters.
    pub array_filters: Option<Vec<Document>>,
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Return the document before or after the update.
    pub return_document: Option<ReturnDocument>,
    /// Picks the first of several matches.
    pub sort: Option<Document>,
    /// Insert when nothing matches.
    pub upsert: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

/// Options for `find_one_and_replace`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndReplaceOptions {
    /// Skip schema validation.
    pub bypass_document_validation: Option<bool>,
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Return the document before or after the replacement.
    pub return_document: Option<ReturnDocument>,
    /// Picks the first of several matches.
    pub sort: Option<Document>,
    /// Insert when nothing matches.
    pub upsert: Option<bool>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

impl From<FindOneAndReplaceOptions> for FindOneAndUpdateOptions {
    fn from(options: FindOneAndReplaceOptions) -> Self {
        FindOneAndUpdateOptions {
            array_filters: None,
            bypass_document_validation: options.bypass_document_validation,
            collation: options.collation,
            comment: options.comment,
            hint: options.hint,
            max_time_ms: options.max_time_ms,
            projection: options.projection,
            return_document: options.return_document,
            sort: options.sort,
            upsert: options.upsert,
            write_concern: options.write_concern,
            let_vars: options.let_vars,
        }
    }
}

/// Options for `find_one_and_delete`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndDeleteOptions {
    /// Collation.
    pub collation: Option<Collation>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Index hint.
    pub hint: Option<Hint>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Picks the first of several matches.
    pub sort: Option<Document>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Variables for `$expr`.
    pub let_vars: Option<Document>,
}

// ============================================================================
// Index and administration options
// ============================================================================

/// Options for `createIndexes`.
#[derive(Debug, Clone, Default)]
pub struct CreateIndexOptions {
    /// Members that must finish the build before it is ready.
    pub commit_quorum: Option<Bson>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

/// Options for `dropIndexes`.
#[derive(Debug, Clone, Default)]
pub struct DropIndexOptions {
    /// Comment attached to the command.
    pub comment: Option<Bson>,
    /// Server execution time limit.
    pub max_time_ms: Option<u64>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

/// Options for `listCollections`.
#[derive(Debug, Clone, Default)]
pub struct ListCollectionsOptions {
    /// Only collections the user may access.
    pub authorized_collections: Option<bool>,
    /// Documents per batch.
    pub batch_size: Option<u32>,
    /// Comment attached to the command.
    pub comment: Option<Bson>,
}

/// Options for dropping a collection or database.
#[derive(Debug, Clone, Default)]
pub struct DropOptions {
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
}

// ============================================================================
// Command assembly helpers
// ============================================================================

/// Small helpers for writing optional fields into command documents.
pub(crate) trait CommandExt {
    fn put_opt(&mut self, key: &str, value: Option<impl Into<Bson>>);
    fn put_u64(&mut self, key: &str, value: Option<u64>);
    fn put_read_concern(&mut self, read_concern: Option<&ReadConcern>);
    fn put_write_concern(&mut self, write_concern: Option<&WriteConcern>);
    fn put_collation(&mut self, collation: Option<&Collation>) -> crate::Result<()>;
    fn put_hint(&mut self, hint: Option<&Hint>);
}

impl CommandExt for Document {
    fn put_read_concern(&mut self, read_concern: Option<&ReadConcern>) {
        if let Some(rc) = read_concern {
            self.insert("readConcern", rc.to_document());
        }
    }

    fn put_write_concern(&mut self, write_concern: Option<&WriteConcern>) {
        if let Some(wc) = write_concern {
            let wc = wc.to_document();
            if !wc.is_empty() {
                self.insert("writeConcern", wc);
            }
        }
    }

    fn put_collation(&mut self, collation: Option<&Collation>) -> crate::Result<()> {
        if let Some(collation) = collation {
            self.insert("collation", collation.to_document()?);
        }
        Ok(())
    }

    fn put_hint(&mut self, hint: Option<&Hint>) {
        if let Some(hint) = hint {
            self.insert("hint", hint.to_bson());
        }
    }

    fn put_opt(&mut self, key: &str, value: Option<impl Into<Bson>>) {
        if let Some(value) = value {
            self.insert(key, value.into());
        }
    }

    fn put_u64(&mut self, key: &str, value: Option<u64>) {
        if let Some(value) = value {
            self.insert(key, value as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_concern_document() {
        let wc = WriteConcern {
            w: Some(Acknowledgment::Majority),
            w_timeout_ms: Some(500),
            journal: Some(true),
        };
        assert_eq!(
            wc.to_document(),
            doc! { "w": "majority", "wtimeout": 500_i64, "j": true }
        );
        assert!(wc.is_acknowledged());
        assert!(!WriteConcern::nodes(0).is_acknowledged());
    }

    #[test]
    fn test_read_concern_levels() {
        assert_eq!(ReadConcern::majority().to_document(), doc! { "level": "majority" });
        assert_eq!(
            ReadConcernLevel::from_str("weird"),
            ReadConcernLevel::Custom("weird".into())
        );
        assert_eq!(ReadConcernLevel::from_str("snapshot").as_str(), "snapshot");
    }

    #[test]
    fn test_read_preference_modes() {
        assert_eq!(
            ReadPreferenceMode::from_str("secondaryPreferred"),
            Some(ReadPreferenceMode::SecondaryPreferred)
        );
        assert_eq!(ReadPreferenceMode::from_str("bogus"), None);
        assert!(ReadPreference::default().is_primary());
        assert!(!ReadPreference::nearest().is_primary());
    }

    #[test]
    fn test_collation_skips_unset_fields() {
        let collation = Collation {
            strength: Some(2),
            ..Collation::new("fr")
        };
        assert_eq!(
            collation.to_document().unwrap(),
            doc! { "locale": "fr", "strength": 2 }
        );
    }

    #[test]
    fn test_find_options_builder() {
        let options = FindOptions::builder()
            .limit(10)
            .skip(5)
            .sort(doc! { "name": 1 })
            .hint("name_1")
            .build();

        assert_eq!(options.limit, Some(10));
        assert_eq!(options.skip, Some(5));
        assert_eq!(options.hint, Some(Hint::Name("name_1".into())));
    }

    #[test]
    fn test_find_one_options_force_single_batch() {
        let options: FindOptions = FindOneOptions {
            skip: Some(2),
            ..Default::default()
        }
        .into();
        assert_eq!(options.limit, Some(-1));
        assert_eq!(options.skip, Some(2));
    }

    #[test]
    fn test_transaction_options_merge() {
        let defaults = TransactionOptions::builder()
            .write_concern(WriteConcern::majority())
            .max_commit_time_ms(100)
            .build();
        let merged = TransactionOptions::builder()
            .max_commit_time_ms(5)
            .build()
            .merged_with(Some(&defaults));

        assert_eq!(merged.write_concern, Some(WriteConcern::majority()));
        assert_eq!(merged.max_commit_time_ms, Some(5));
    }

    #[test]
    fn test_command_ext() {
        let mut cmd = doc! { "find": "c" };
        cmd.put_opt("comment", None::<&str>);
        cmd.put_opt("singleBatch", Some(true));
        cmd.put_u64("skip", Some(3));
        assert_eq!(cmd, doc! { "find": "c", "singleBatch": true, "skip": 3_i64 });
    }
}
