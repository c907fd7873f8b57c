//! Document codec: the boundary between user values and BSON envelopes.

use crate::error::{MongoError, Result};
use bson::{Bson, Document};
use chrono::{FixedOffset, Offset, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

/// Largest document the server accepts.
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// How top-level keys of user documents are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCase {
    /// Keys are sent as written.
    #[default]
    Preserve,
    /// `snake_case` keys are stored as `camelCase` and read back as `snake_case`.
    SnakeCase,
}

/// Codec configuration, fixed when a client, database or collection is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    /// Render datetimes with an offset.
    pub tz_aware: bool,
    /// Offset used for timezone-aware rendering.
    pub timezone: FixedOffset,
    /// Key rewriting policy.
    pub key_case: KeyCase,
    /// Maximum encoded size in bytes.
    pub max_document_size: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            tz_aware: true,
            timezone: Utc.fix(),
            key_case: KeyCase::Preserve,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }
}

impl CodecOptions {
    /// Create a builder.
    pub fn builder() -> CodecOptionsBuilder {
        CodecOptionsBuilder::default()
    }
}

/// Builder for CodecOptions.
#[derive(Debug, Clone, Default)]
pub struct CodecOptionsBuilder {
    options: CodecOptions,
}

impl CodecOptionsBuilder {
    /// Set timezone awareness.
    pub fn tz_aware(mut self, tz_aware: bool) -> Self {
        self.options.tz_aware = tz_aware;
        self
    }

    /// Set the rendering offset.
    pub fn timezone(mut self, timezone: FixedOffset) -> Self {
        self.options.timezone = timezone;
        self
    }

    /// Set the key policy.
    pub fn key_case(mut self, key_case: KeyCase) -> Self {
        self.options.key_case = key_case;
        self
    }

    /// Set the maximum document size.
    pub fn max_document_size(mut self, size: usize) -> Self {
        self.options.max_document_size = size;
        self
    }

    /// Build the options.
    pub fn build(self) -> CodecOptions {
        self.options
    }
}

/// Encodes and decodes documents under one [`CodecOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codec {
    options: CodecOptions,
}

impl Codec {
    /// Create a codec.
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    /// The options this codec was built with.
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Encode an optional document. Absent and empty documents encode to `None`.
    pub fn encode(&self, doc: Option<&Document>) -> Result<Option<Vec<u8>>> {
        match doc {
            Some(doc) if !doc.is_empty() => self.encode_required(doc).map(Some),
            _ => Ok(None),
        }
    }

    /// Encode a document, producing an explicit envelope even when it is empty.
    pub fn encode_required(&self, doc: &Document) -> Result<Vec<u8>> {
        let doc = self.outgoing(doc.clone());
        let mut buf = Vec::new();
        doc.to_writer(&mut buf)?;
        self.check_size(buf.len())?;
        Ok(buf)
    }

    /// Decode an optional envelope.
    pub fn decode(&self, data: Option<&[u8]>) -> Result<Option<Document>> {
        let Some(mut bytes) = data else {
            return Ok(None);
        };
        let doc = Document::from_reader(&mut bytes)
            .map_err(|e| MongoError::Deserialization(e.to_string()))?;
        Ok(Some(self.incoming(doc)))
    }

    /// Serialize a user value into a document ready to send.
    pub fn to_document<T: Serialize + ?Sized>(&self, value: &T) -> Result<Document> {
        let doc = bson::to_document(value)?;
        Ok(self.outgoing(doc))
    }

    /// Deserialize a document received from the server.
    pub fn from_document<T: DeserializeOwned>(&self, doc: Document) -> Result<T> {
        Ok(bson::from_document(self.incoming(doc))?)
    }

    /// Encoded size of `doc`, rejecting documents over the configured limit.
    pub fn checked_len(&self, doc: &Document) -> Result<usize> {
        let mut buf = Vec::new();
        doc.to_writer(&mut buf)?;
        self.check_size(buf.len())?;
        Ok(buf.len())
    }

    /// Render a document as relaxed extended JSON. Datetimes follow the
    /// timezone policy.
    pub fn to_json(&self, doc: &Document) -> JsonValue {
        JsonValue::Object(
            doc.iter()
                .map(|(key, value)| (key.clone(), self.bson_to_json(value)))
                .collect(),
        )
    }

    /// Parse extended JSON into a document.
    pub fn from_json(&self, value: JsonValue) -> Result<Document> {
        match Bson::try_from(value) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(other) => Err(MongoError::invalid_argument(format!(
                "expected a JSON object, got {:?}",
                other.element_type()
            ))),
            Err(e) => Err(MongoError::Deserialization(e.to_string())),
        }
    }

    fn bson_to_json(&self, value: &Bson) -> JsonValue {
        match value {
            Bson::DateTime(dt) => {
                let utc = dt.to_chrono();
                let rendered = if self.options.tz_aware {
                    utc.with_timezone(&self.options.timezone).to_rfc3339()
                } else {
                    utc.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
                };
                JsonValue::String(rendered)
            }
            Bson::Document(doc) => self.to_json(doc),
            Bson::Array(items) => {
                JsonValue::Array(items.iter().map(|item| self.bson_to_json(item)).collect())
            }
            other => other.clone().into_relaxed_extjson(),
        }
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.options.max_document_size {
            return Err(MongoError::Serialization(format!(
                "document of {} bytes exceeds the {} byte limit",
                len, self.options.max_document_size
            )));
        }
        Ok(())
    }

    /// Rewrite the top-level keys of a document, sort or projection.
    pub(crate) fn outgoing(&self, doc: Document) -> Document {
        match self.options.key_case {
            KeyCase::Preserve => doc,
            KeyCase::SnakeCase => rename_keys(doc, to_camel_case),
        }
    }

    pub(crate) fn incoming(&self, doc: Document) -> Document {
        match self.options.key_case {
            KeyCase::Preserve => doc,
            KeyCase::SnakeCase => rename_keys(doc, to_snake_case),
        }
    }

    /// Rewrite the field paths of a query filter, including those nested
    /// under `$and`, `$or` and `$nor`. Operator documents are left alone.
    pub(crate) fn outgoing_filter(&self, filter: Document) -> Document {
        match self.options.key_case {
            KeyCase::Preserve => filter,
            KeyCase::SnakeCase => camel_filter(filter),
        }
    }

    /// Rewrite the field paths under each operator of an update document.
    /// `$rename` targets are rewritten too.
    pub(crate) fn outgoing_update(&self, update: Document) -> Document {
        if self.options.key_case == KeyCase::Preserve {
            return update;
        }
        update
            .into_iter()
            .map(|(op, value)| {
                let value = match value {
                    Bson::Document(fields) if op == "$rename" => Bson::Document(
                        fields
                            .into_iter()
                            .map(|(from, to)| {
                                let to = match to {
                                    Bson::String(to) => Bson::String(rename_path(&to, to_camel_case)),
                                    other => other,
                                };
                                (rename_path(&from, to_camel_case), to)
                            })
                            .collect(),
                    ),
                    Bson::Document(fields) if op.starts_with('$') => {
                        Bson::Document(rename_keys(fields, to_camel_case))
                    }
                    other => other,
                };
                (op, value)
            })
            .collect()
    }

    /// Rewrite a single field path, such as a `distinct` key.
    pub(crate) fn outgoing_path(&self, path: &str) -> String {
        match self.options.key_case {
            KeyCase::Preserve => path.to_string(),
            KeyCase::SnakeCase => rename_path(path, to_camel_case),
        }
    }
}

const LOGICAL_OPERATORS: [&str; 3] = ["$and", "$or", "$nor"];

fn camel_filter(filter: Document) -> Document {
    filter
        .into_iter()
        .map(|(key, value)| {
            if !LOGICAL_OPERATORS.contains(&key.as_str()) {
                return (rename_path(&key, to_camel_case), value);
            }
            let value = match value {
                Bson::Array(clauses) => Bson::Array(
                    clauses
                        .into_iter()
                        .map(|clause| match clause {
                            Bson::Document(clause) => Bson::Document(camel_filter(clause)),
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            };
            (key, value)
        })
        .collect()
}

fn rename_keys(doc: Document, rename: fn(&str) -> String) -> Document {
    doc.into_iter()
        .map(|(key, value)| (rename_path(&key, rename), value))
        .collect()
}

/// Rename each segment of a dotted path. Reserved (`_id`, `$[]`) and
/// positional segments stay as written.
fn rename_path(path: &str, rename: fn(&str) -> String) -> String {
    path.split('.')
        .map(|segment| {
            if segment.starts_with('_')
                || segment.starts_with('$')
                || segment.chars().all(|c| c.is_ascii_digit())
            {
                segment.to_string()
            } else {
                rename(segment)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// `created_at` -> `createdAt`.
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for ch in s.chars() {
        if ch == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// `createdAt` -> `created_at`.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[test]
    fn test_encode_absent_and_empty() {
        let codec = Codec::default();
        assert_eq!(codec.encode(None).unwrap(), None);
        assert_eq!(codec.encode(Some(&Document::new())).unwrap(), None);
        assert_eq!(codec.encode_required(&Document::new()).unwrap().len(), 5);
    }

    #[test]
    fn test_decode_null_transparent() {
        let codec = Codec::default();
        assert_eq!(codec.decode(None).unwrap(), None);

        let bytes = codec.encode_required(&doc! { "a": 1, "b": "x" }).unwrap();
        let decoded = codec.decode(Some(&bytes)).unwrap().unwrap();
        assert_eq!(decoded, doc! { "a": 1, "b": "x" });
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = Codec::default();
        let err = codec.decode(Some(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, MongoError::Deserialization(_)));
    }

    #[test]
    fn test_size_limit() {
        let codec = Codec::new(CodecOptions::builder().max_document_size(32).build());
        let err = codec
            .encode_required(&doc! { "payload": "x".repeat(64) })
            .unwrap_err();
        assert!(matches!(err, MongoError::Serialization(_)));
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("a_b_c"), "aBC");
        assert_eq!(to_camel_case("name"), "name");
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("name"), "name");
    }

    #[test]
    fn test_snake_case_policy_skips_reserved_keys() {
        let codec = Codec::new(CodecOptions::builder().key_case(KeyCase::SnakeCase).build());
        let out = codec.outgoing(doc! { "_id": 1, "first_name": "a", "$comment": "c" });
        assert_eq!(out, doc! { "_id": 1, "firstName": "a", "$comment": "c" });
        assert_eq!(codec.incoming(out), doc! { "_id": 1, "first_name": "a", "$comment": "c" });
    }

    #[test]
    fn test_snake_case_reaches_operators_and_paths() {
        let codec = Codec::new(CodecOptions::builder().key_case(KeyCase::SnakeCase).build());

        let update = codec.outgoing_update(doc! {
            "$set": { "display_name": "Bo", "address.zip_code": "1", "tags.0": "x" },
            "$inc": { "login_count": 1 },
            "$rename": { "old_name": "new_name" },
        });
        assert_eq!(
            update,
            doc! {
                "$set": { "displayName": "Bo", "address.zipCode": "1", "tags.0": "x" },
                "$inc": { "loginCount": 1 },
                "$rename": { "oldName": "newName" },
            }
        );

        let filter = codec.outgoing_filter(doc! {
            "display_name": { "$in": ["a_b"] },
            "$or": [{ "login_count": { "$gt": 1 } }, { "_id": 3 }],
        });
        assert_eq!(
            filter,
            doc! {
                "displayName": { "$in": ["a_b"] },
                "$or": [{ "loginCount": { "$gt": 1 } }, { "_id": 3 }],
            }
        );

        assert_eq!(codec.outgoing_path("items.$.unit_price"), "items.$.unitPrice");
        assert_eq!(Codec::default().outgoing_path("unit_price"), "unit_price");
        let update = doc! { "$set": { "display_name": 1 } };
        assert_eq!(Codec::default().outgoing_update(update.clone()), update);
    }

    #[test]
    fn test_typed_roundtrip_with_snake_case() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct User {
            first_name: String,
        }

        let codec = Codec::new(CodecOptions::builder().key_case(KeyCase::SnakeCase).build());
        let doc = codec
            .to_document(&User {
                first_name: "Ann".into(),
            })
            .unwrap();
        assert_eq!(doc, doc! { "firstName": "Ann" });

        let user: User = codec.from_document(doc).unwrap();
        assert_eq!(user.first_name, "Ann");
    }

    #[test]
    fn test_to_json_datetime_policy() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let doc = doc! { "at": bson::DateTime::from_chrono(when), "n": 1 };

        let aware = Codec::default().to_json(&doc);
        assert_eq!(aware["at"], "2024-01-02T03:04:05+00:00");
        assert_eq!(aware["n"], 1);

        let naive = Codec::new(CodecOptions::builder().tz_aware(false).build()).to_json(&doc);
        assert_eq!(naive["at"], "2024-01-02T03:04:05.000");

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let shifted =
            Codec::new(CodecOptions::builder().timezone(plus_two).build()).to_json(&doc);
        assert_eq!(shifted["at"], "2024-01-02T05:04:05+02:00");
    }

    #[test]
    fn test_from_json() {
        let codec = Codec::default();
        let doc = codec
            .from_json(serde_json::json!({ "a": 1, "b": { "$oid": "507f1f77bcf86cd799439011" } }))
            .unwrap();
        assert!(matches!(doc.get("b"), Some(Bson::ObjectId(_))));

        let err = codec.from_json(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, MongoError::InvalidArgument(_)));
    }
}
