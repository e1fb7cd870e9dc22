//! Collection-oriented entity storage.
//!
//! The backend is consumed through the [`Store`] trait only: five operations
//! over opaque JSON documents, with equality filters and dotted-path patch
//! documents (as produced by [`crate::patch::build_patch`]). Entities are
//! keyed by 24-hex-character [`EntityId`]s.

use async_trait::async_trait;
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// An opaque storage document: a JSON object in deterministic key order.
pub type Document = serde_json::Map<String, Value>;

/// Collection names used by the API handlers.
pub mod collections {
    pub const USERS: &str = "users";
    pub const COMPANIES: &str = "companies";
    pub const PROJECTS: &str = "projects";
    pub const REPORTS: &str = "bug_reports";
    pub const COMMENTS: &str = "comments";

    pub const ALL: [&str; 5] = [USERS, COMPANIES, PROJECTS, REPORTS, COMMENTS];
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage operation timed out")]
    Timeout,
    #[error("storage backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub(crate) fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}

#[derive(Debug, Error)]
#[error("invalid entity id: expected 24 hex characters")]
pub struct InvalidEntityId;

/// A 24-hex-character entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh random identifier (12 random bytes, hex encoded).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidEntityId)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::String(id.0)
    }
}

impl From<&EntityId> for Value {
    fn from(id: &EntityId) -> Self {
        Value::String(id.0.clone())
    }
}

impl utoipa::PartialSchema for EntityId {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        <String as utoipa::PartialSchema>::schema()
    }
}

impl utoipa::ToSchema for EntityId {
    fn name() -> std::borrow::Cow<'static, str> {
        std::borrow::Cow::Borrowed("EntityId")
    }
}

/// The storage contract: one trait, five operations, implemented once per
/// backing store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Return the first document matching `filter`, or `None`.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Return every document matching `filter`, in stable id order.
    async fn find(&self, collection: &str, filter: &Document)
        -> Result<Vec<Document>, StoreError>;

    /// Insert a document, generating an `_id` when none is present, and
    /// return the document id.
    async fn insert_one(&self, collection: &str, document: Document)
        -> Result<EntityId, StoreError>;

    /// Apply a dotted-path patch to the first document matching `filter`.
    /// Returns the number of modified documents (0 or 1).
    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        patch: &Document,
    ) -> Result<u64, StoreError>;

    /// Delete the first document matching `filter`. Returns the number of
    /// deleted documents (0 or 1).
    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError>;
}

/// Serialize an entity into a storage document.
///
/// # Errors
///
/// Fails if the value does not serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value).map_err(StoreError::backend)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::backend(anyhow::anyhow!(
            "expected a record, got {other}"
        ))),
    }
}

/// Decode a storage document into an entity.
///
/// # Errors
///
/// Fails if the document does not match the entity shape.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(StoreError::backend)
}

/// Build a single-field equality filter.
#[must_use]
pub fn filter_eq(key: &str, value: impl Into<Value>) -> Document {
    let mut filter = Document::new();
    filter.insert(key.to_string(), value.into());
    filter
}

/// True when every filter field equals the corresponding document field.
/// Filter keys may use dotted paths into nested records.
#[must_use]
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(path, expected)| lookup_path(doc, path) == Some(expected))
}

fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((head, rest)) => match doc.get(head) {
            Some(Value::Object(nested)) => lookup_path(nested, rest),
            _ => None,
        },
    }
}

/// Apply a dotted-path patch to a document, creating intermediate records as
/// needed.
pub fn apply_patch(doc: &mut Document, patch: &Document) {
    for (path, value) in patch {
        set_path(doc, path, value.clone());
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(nested) = entry {
                set_path(nested, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_24_lowercase_hex() {
        let id = EntityId::generate();
        assert_eq!(id.as_str().len(), 24);
        assert!(id
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn entity_id_parses_and_normalizes_case() -> Result<(), InvalidEntityId> {
        let id: EntityId = "68E23B3D997DEADD848A490B".parse()?;
        assert_eq!(id.as_str(), "68e23b3d997deadd848a490b");
        Ok(())
    }

    #[test]
    fn entity_id_rejects_bad_input() {
        assert!("".parse::<EntityId>().is_err());
        assert!("68e23b3d".parse::<EntityId>().is_err());
        assert!("68e23b3d997deadd848a490bff".parse::<EntityId>().is_err());
        assert!("68e23b3d997deadd848a490g".parse::<EntityId>().is_err());
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn matches_filter_on_flat_and_dotted_paths() {
        let record = doc(json!({
            "email": "ada@example.test",
            "active": true,
            "template": {"title": "crash"}
        }));

        assert!(matches_filter(&record, &Document::new()));
        assert!(matches_filter(
            &record,
            &filter_eq("email", "ada@example.test")
        ));
        assert!(matches_filter(&record, &filter_eq("template.title", "crash")));
        assert!(!matches_filter(&record, &filter_eq("email", "other")));
        assert!(!matches_filter(&record, &filter_eq("missing", "x")));
        assert!(!matches_filter(&record, &filter_eq("email.nested", "x")));
    }

    #[test]
    fn apply_patch_sets_and_creates_nested_fields() {
        let mut record = doc(json!({"name": "old", "template": {"title": "t"}}));
        let patch = doc(json!({
            "name": "new",
            "template.steps": "1. open the app",
            "audit.updatedBy": "68e23b3d997deadd848a490b"
        }));

        apply_patch(&mut record, &patch);
        assert_eq!(
            Value::Object(record),
            json!({
                "name": "new",
                "template": {"title": "t", "steps": "1. open the app"},
                "audit": {"updatedBy": "68e23b3d997deadd848a490b"}
            })
        );
    }

    #[test]
    fn document_round_trip() -> Result<(), StoreError> {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Probe {
            #[serde(rename = "_id")]
            id: EntityId,
            name: String,
        }

        let probe = Probe {
            id: EntityId::generate(),
            name: "probe".to_string(),
        };
        let document = to_document(&probe)?;
        assert!(document.contains_key("_id"));

        let back: Probe = from_document(document)?;
        assert_eq!(back, probe);
        Ok(())
    }
}
