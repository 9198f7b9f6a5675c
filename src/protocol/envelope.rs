//! Uniform response envelopes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// `{status: "success", data: <data>}`
pub fn success(data: Value) -> Value {
    json!({ "status": STATUS_SUCCESS, "data": data })
}

/// `{status: "error", error: <message>}`
pub fn error(message: impl Into<String>) -> Value {
    json!({ "status": STATUS_ERROR, "error": message.into() })
}

/// Response to a record that is not a JSON object.
pub fn invalid_json() -> Value {
    error("invalid json")
}

/// Add transmission metadata: the processing timestamp and, when known, the user.
pub fn stamp(envelope: &mut Value, user: Option<&str>, now: DateTime<Utc>) {
    if let Value::Object(map) = envelope {
        map.insert(
            "processed_at".to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        if let Some(user) = user {
            map.insert("user".to_string(), Value::String(user.to_string()));
        }
    }
}
