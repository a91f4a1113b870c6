//! Conversion from generic resource objects to domain records.
//!
//! The watch transport hands over objects as untyped JSON trees:
//!
//! ```json
//! {
//!   "apiVersion": "alpha.bloggernetes.davies.me.uk/v1",
//!   "kind": "BlogPost",
//!   "metadata": { "name": "hello", "namespace": "default" },
//!   "spec": { "id": "hello", "title": "Hello", "authoredDate": "2024-01-01T00:00:00Z" }
//! }
//! ```
//!
//! All type uncertainty stays in this module. Each field is read through a
//! typed extractor that yields `None` on absence or type mismatch; optional
//! fields then fall back to their zero value. Only the identity and the
//! publication timestamp are mandatory.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{Page, Post};

/// Key of the content section inside a resource object.
const SPEC_KEY: &str = "spec";

/// Why a single record could not be converted.
///
/// Failures are per-object: callers log and skip, never abort a stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("required field `{0}` is missing or malformed")]
    MissingRequiredField(&'static str),

    #[error("record has no `spec` section")]
    MalformedRecord,
}

/// Convert a `BlogPost` object into a [`Post`].
///
/// # Errors
///
/// - [`ConvertError::MalformedRecord`] if there is no `spec` map.
/// - [`ConvertError::MissingRequiredField`] if `id` is absent or empty, or if
///   `authoredDate` is absent or not an RFC 3339 timestamp.
pub fn post_from_record(record: &Value) -> Result<Post, ConvertError> {
    let spec = spec_section(record)?;
    let id = required_id(spec)?;
    let authored_date = timestamp_field(spec, "authoredDate")
        .ok_or(ConvertError::MissingRequiredField("authoredDate"))?;

    Ok(Post {
        id,
        title: string_field(spec, "title").unwrap_or_default().to_owned(),
        meta_description: string_field(spec, "metaDescription")
            .unwrap_or_default()
            .to_owned(),
        body: string_field(spec, "body").unwrap_or_default().to_owned(),
        author: string_field(spec, "author").unwrap_or_default().to_owned(),
        tags: string_list_field(spec, "tags").unwrap_or_default(),
        authored_date,
        // Best-effort: a broken secondary date does not reject the post
        updated_date: timestamp_field(spec, "updatedDate"),
    })
}

/// Convert a `BlogPage` object into a [`Page`].
///
/// # Errors
///
/// - [`ConvertError::MalformedRecord`] if there is no `spec` map.
/// - [`ConvertError::MissingRequiredField`] if `id` is absent or empty.
pub fn page_from_record(record: &Value) -> Result<Page, ConvertError> {
    let spec = spec_section(record)?;

    Ok(Page {
        id: required_id(spec)?,
        title: string_field(spec, "title").unwrap_or_default().to_owned(),
        content: string_field(spec, "content").unwrap_or_default().to_owned(),
        order: integer_field(spec, "order").unwrap_or(0),
    })
}

// ============================================================================
// Field Extractors
// ============================================================================

fn spec_section(record: &Value) -> Result<&Map<String, Value>, ConvertError> {
    record
        .get(SPEC_KEY)
        .and_then(Value::as_object)
        .ok_or(ConvertError::MalformedRecord)
}

fn required_id(spec: &Map<String, Value>) -> Result<String, ConvertError> {
    string_field(spec, "id")
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or(ConvertError::MissingRequiredField("id"))
}

/// Read a string; any other JSON type counts as absent.
fn string_field<'a>(spec: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    spec.get(key).and_then(Value::as_str)
}

/// Read a sequence of strings, silently skipping non-string elements.
fn string_list_field(spec: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let items = spec.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
    )
}

/// Read a whole number. Floats (even `2.0`) and numeric strings are rejected.
fn integer_field(spec: &Map<String, Value>, key: &str) -> Option<i64> {
    spec.get(key).and_then(Value::as_i64)
}

/// Read an RFC 3339 timestamp (`2006-01-02T15:04:05Z07:00`). No other
/// formats are attempted; empty strings count as absent.
fn timestamp_field(spec: &Map<String, Value>, key: &str) -> Option<DateTime<FixedOffset>> {
    let raw = string_field(spec, key)?;
    DateTime::parse_from_rfc3339(raw).ok()
}
