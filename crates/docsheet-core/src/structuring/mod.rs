//! Structuring service trait and the response-path decoder shared by its
//! implementations.

pub mod canvas;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

use crate::{ExtractedText, StructuredRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuringError {
    /// Transport failure, auth failure, rate limiting or any non-2xx status.
    #[error("{message}")]
    Service {
        status: Option<u16>,
        message: String,
    },
    /// The response did not contain a record array at the documented path.
    #[error("schema error at `{path}`: {detail}")]
    Schema { path: String, detail: String },
}

impl StructuringError {
    pub fn schema(path: impl Into<String>, detail: impl Into<String>) -> Self {
        StructuringError::Schema {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// A service that turns raw document text into structured records.
///
/// Implementations are shared across workers behind an `Arc` and must not
/// keep mutable state between calls.
pub trait StructuringService: Send + Sync {
    /// Human-readable service name, used in logs.
    fn name(&self) -> &str;

    /// Structure one document. Records are returned in service order.
    fn structure<'a>(
        &'a self,
        document: &'a ExtractedText,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StructuredRecord>, StructuringError>> + Send + 'a>>;
}

/// Decode the record array at `choices[0].message.content.<records_field>`.
///
/// `content` may be an object or a string holding a JSON object. The value at
/// the path must be an array whose entries are all objects; an empty array is
/// a valid zero-yield response.
pub fn records_from_completion(
    payload: &Value,
    records_field: &str,
) -> Result<Vec<StructuredRecord>, StructuringError> {
    let choice = payload
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| StructuringError::schema("choices[0]", "missing or empty `choices` array"))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .ok_or_else(|| StructuringError::schema("choices[0].message.content", "field is absent"))?;

    // Some canvases return the structured object serialized as a string.
    let parsed;
    let content = match content {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).map_err(|e| {
                StructuringError::schema(
                    "choices[0].message.content",
                    format!("content is a string but not JSON: {}", e),
                )
            })?;
            &parsed
        }
        other => other,
    };

    let path = format!("choices[0].message.content.{}", records_field);
    let entries = match content.get(records_field) {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(StructuringError::schema(
                path,
                format!("expected an array, found {}", json_type(other)),
            ));
        }
        None => return Err(StructuringError::schema(path, "field is absent")),
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            Value::Object(fields) => Ok(StructuredRecord::new(fields.clone())),
            other => Err(StructuringError::schema(
                format!("{}[{}]", path, i),
                format!("expected an object, found {}", json_type(other)),
            )),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
