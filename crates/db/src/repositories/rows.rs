use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::RepositoryError;

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

/// Decodes a JSON text column. Unparseable text becomes `null` so the resolver can fall back.
pub(crate) fn json_column(column: &str, value: Option<String>) -> Value {
    let Some(raw) = value else {
        return Value::Null;
    };
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        warn!(
            event_name = "db.rows.malformed_json",
            column,
            error = %error,
            "stored JSON could not be parsed, reading it as null"
        );
        Value::Null
    })
}

pub(crate) fn encode_json(column: &str, value: &impl serde::Serialize) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode `{column}`: {error}")))
}
