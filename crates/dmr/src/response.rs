//! Helpers for reading management responses.
//!
//! A response is `{"outcome": "success", "result": ...}` or
//! `{"outcome": "failed", "failure-description": ...}`.

use crate::ModelNode;
use serde_json::{Map, Value};

/// Key holding the outcome.
pub const OUTCOME: &str = "outcome";
/// Successful outcome value.
pub const SUCCESS: &str = "success";
/// Failed outcome value.
pub const FAILED: &str = "failed";
/// Key holding the result payload.
pub const RESULT: &str = "result";
/// Key holding the failure description.
pub const FAILURE_DESCRIPTION: &str = "failure-description";

/// Whether the response reports success.
pub fn is_success(response: &ModelNode) -> bool {
    response.get(OUTCOME).and_then(Value::as_str) == Some(SUCCESS)
}

/// Human-readable failure description.
///
/// Strings are returned verbatim; structured descriptions (composite
/// failures) are rendered as compact JSON.
pub fn failure_description(response: &ModelNode) -> String {
    match response.get(FAILURE_DESCRIPTION) {
        Some(Value::String(desc)) => desc.clone(),
        Some(Value::Null) | None => format!("operation failed without a description: {}", response),
        Some(other) => other.to_string(),
    }
}

/// The `result` payload, if defined.
pub fn result(response: &ModelNode) -> Option<&ModelNode> {
    response.get(RESULT).filter(|r| !r.is_null())
}

/// A field of the `result` payload.
pub fn read_result_field<'a>(response: &'a ModelNode, field: &str) -> Option<&'a ModelNode> {
    result(response)
        .and_then(|r| r.get(field))
        .filter(|v| !v.is_null())
}

/// Build a success response.
pub fn success(result: ModelNode) -> ModelNode {
    let mut node = Map::new();
    node.insert(OUTCOME.to_string(), Value::String(SUCCESS.to_string()));
    node.insert(RESULT.to_string(), result);
    Value::Object(node)
}

/// Build a failure response.
pub fn failure(description: impl Into<String>) -> ModelNode {
    let mut node = Map::new();
    node.insert(OUTCOME.to_string(), Value::String(FAILED.to_string()));
    node.insert(
        FAILURE_DESCRIPTION.to_string(),
        Value::String(description.into()),
    );
    Value::Object(node)
}
