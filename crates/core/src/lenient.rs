//! Tolerant readers for JSON columns whose shape is not guaranteed.
//!
//! Every reader returns a usable value and logs a `core.lenient.malformed_field` warning when
//! the stored shape is unexpected. `null`/missing values are silent.

use serde_json::{Map, Value};
use tracing::warn;

/// Truthiness of a loosely typed flag value (`true`, non-zero numbers, non-empty strings and
/// collections).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

pub fn list_or_empty(field: &str, value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            warn!(
                event_name = "core.lenient.malformed_field",
                field,
                found = kind_of(other),
                "expected a list, using an empty list"
            );
            Vec::new()
        }
    }
}

pub fn object_or_empty(field: &str, value: Option<&Value>) -> Map<String, Value> {
    match value {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(entries)) => entries.clone(),
        Some(other) => {
            warn!(
                event_name = "core.lenient.malformed_field",
                field,
                found = kind_of(other),
                "expected an object, using an empty object"
            );
            Map::new()
        }
    }
}

pub fn string_or_none(field: &str, value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            warn!(
                event_name = "core.lenient.malformed_field",
                field,
                found = kind_of(other),
                "expected a string, ignoring value"
            );
            None
        }
    }
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
