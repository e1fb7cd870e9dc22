//! Sparse update document construction.
//!
//! [`build_patch`] turns a partial-update request value into a flat map of
//! dotted field paths to new values, suitable as a `$set`-style storage
//! patch. A field appears in the patch iff it carries a non-default value:
//! empty strings, `false`, zero numbers, empty collections, and absent
//! optionals all mean "do not touch this field".

use crate::store::Document;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("update request is not a record: {0}")]
    NotARecord(&'static str),
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
}

/// Build a sparse patch document from a partial-update value.
///
/// Nested records are flattened with `parent.child` dotted paths; a nested
/// record whose fields are all default contributes no keys at all. Fields
/// without a serialized name never appear. Non-record leaf serializations
/// (timestamps, ids, enums) are treated as atomic values.
///
/// The output is deterministic for identical input.
///
/// # Errors
///
/// Returns an error if the value does not serialize to a JSON object.
pub fn build_patch<T: Serialize>(value: &T) -> Result<Document, Error> {
    let json = serde_json::to_value(value)?;
    let Value::Object(fields) = json else {
        return Err(Error::NotARecord(value_kind(&json)));
    };

    let mut patch = Document::new();
    flatten(None, &fields, &mut patch);
    Ok(patch)
}

fn flatten(prefix: Option<&str>, fields: &Document, patch: &mut Document) {
    for (name, value) in fields {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.clone(),
        };
        match value {
            // Absent optionals mean "leave the stored field alone".
            Value::Null => {}
            Value::Object(nested) => flatten(Some(&path), nested, patch),
            other => {
                if !is_zero(other) {
                    patch.insert(path, other.clone());
                }
            }
        }
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
