//! Index models and canonical index documents.

use crate::error::Result;
use crate::options::Collation;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Direction or type of one indexed field.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDirection {
    /// `1`.
    Ascending,
    /// `-1`.
    Descending,
    /// `"2d"`.
    Geo2d,
    /// `"2dsphere"`.
    Geo2dSphere,
    /// `"hashed"`.
    Hashed,
    /// `"text"`.
    Text,
    /// Any other value, such as `"columnstore"` or `"$**"` specials.
    Custom(Bson),
}

impl IndexDirection {
    /// The value written into the key pattern.
    pub fn to_bson(&self) -> Bson {
        match self {
            IndexDirection::Ascending => Bson::Int32(1),
            IndexDirection::Descending => Bson::Int32(-1),
            IndexDirection::Geo2d => Bson::String("2d".into()),
            IndexDirection::Geo2dSphere => Bson::String("2dsphere".into()),
            IndexDirection::Hashed => Bson::String("hashed".into()),
            IndexDirection::Text => Bson::String("text".into()),
            IndexDirection::Custom(value) => value.clone(),
        }
    }

    fn from_bson(value: &Bson) -> Self {
        match value {
            Bson::Int32(1) | Bson::Int64(1) => IndexDirection::Ascending,
            Bson::Int32(-1) | Bson::Int64(-1) => IndexDirection::Descending,
            Bson::Double(v) if *v == 1.0 => IndexDirection::Ascending,
            Bson::Double(v) if *v == -1.0 => IndexDirection::Descending,
            Bson::String(s) => IndexDirection::from(s.as_str()),
            other => IndexDirection::Custom(other.clone()),
        }
    }

    fn name_part(&self) -> String {
        match self.to_bson() {
            Bson::String(s) => s,
            Bson::Int32(v) => v.to_string(),
            Bson::Int64(v) => v.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<i32> for IndexDirection {
    fn from(value: i32) -> Self {
        match value {
            1 => IndexDirection::Ascending,
            -1 => IndexDirection::Descending,
            other => IndexDirection::Custom(Bson::Int32(other)),
        }
    }
}

impl From<&str> for IndexDirection {
    fn from(value: &str) -> Self {
        match value {
            "2d" => IndexDirection::Geo2d,
            "2dsphere" => IndexDirection::Geo2dSphere,
            "hashed" => IndexDirection::Hashed,
            "text" => IndexDirection::Text,
            other => IndexDirection::Custom(Bson::String(other.to_string())),
        }
    }
}

/// Ordered key pattern of an index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexKeys {
    fields: Vec<(String, IndexDirection)>,
}

impl IndexKeys {
    /// Append a field.
    pub fn push(mut self, field: impl Into<String>, direction: impl Into<IndexDirection>) -> Self {
        self.fields.push((field.into(), direction.into()));
        self
    }

    /// Whether no field was given.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The key pattern document.
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, direction)| (field.clone(), direction.to_bson()))
            .collect()
    }

    /// Default index name: `field_direction` pairs joined by `_`.
    pub fn default_name(&self) -> String {
        self.fields
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction.name_part()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// A single field name means an ascending index on it.
impl From<&str> for IndexKeys {
    fn from(field: &str) -> Self {
        IndexKeys::default().push(field, IndexDirection::Ascending)
    }
}

impl From<String> for IndexKeys {
    fn from(field: String) -> Self {
        IndexKeys::default().push(field, IndexDirection::Ascending)
    }
}

impl From<Document> for IndexKeys {
    fn from(doc: Document) -> Self {
        IndexKeys {
            fields: doc
                .iter()
                .map(|(field, value)| (field.clone(), IndexDirection::from_bson(value)))
                .collect(),
        }
    }
}

impl<S, D> From<Vec<(S, D)>> for IndexKeys
where
    S: Into<String>,
    D: Into<IndexDirection>,
{
    fn from(pairs: Vec<(S, D)>) -> Self {
        IndexKeys {
            fields: pairs
                .into_iter()
                .map(|(field, direction)| (field.into(), direction.into()))
                .collect(),
        }
    }
}

/// Options of an index definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    /// Index name; generated from the keys when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Reject duplicate keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Skip documents missing the indexed field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,
    /// Legacy background build flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    /// TTL in seconds.
    #[serde(rename = "expireAfterSeconds", skip_serializing_if = "Option::is_none")]
    pub expire_after_secs: Option<i64>,
    /// Only index documents matching this filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_filter_expression: Option<Document>,
    /// Storage engine configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_engine: Option<Document>,
    /// Collation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<Collation>,
    /// Text index field weights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Document>,
    /// Text index default language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    /// Field holding a per-document language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_override: Option<String>,
    /// Text index version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_index_version: Option<i32>,
    /// 2dsphere index version.
    #[serde(rename = "2dsphereIndexVersion", skip_serializing_if = "Option::is_none")]
    pub sphere_2d_index_version: Option<i32>,
    /// 2d index precision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<i32>,
    /// 2d index lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// 2d index upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Wildcard index projection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard_projection: Option<Document>,
    /// Hide the index from the planner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

/// Key pattern plus options.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    /// Key pattern.
    pub keys: IndexKeys,
    /// Options.
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    /// Model with default options.
    pub fn new(keys: impl Into<IndexKeys>) -> Self {
        Self {
            keys: keys.into(),
            options: None,
        }
    }

    /// Attach options.
    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Name of the index, explicit or generated.
    pub fn name(&self) -> String {
        self.options
            .as_ref()
            .and_then(|options| options.name.clone())
            .unwrap_or_else(|| self.keys.default_name())
    }

    /// The entry placed in `createIndexes.indexes`.
    pub fn to_document(&self) -> Result<Document> {
        let mut doc = Document::new();
        doc.insert("key", self.keys.to_document());
        doc.insert("name", self.name());
        if let Some(ref options) = self.options {
            for (key, value) in bson::to_document(options)? {
                if key != "name" {
                    doc.insert(key, value);
                }
            }
        }
        Ok(doc)
    }
}
