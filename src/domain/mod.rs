use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DATASET_ID: &str = "analytics";
pub const TABLE_ID: &str = "events";

pub const TRACKED_MESSAGE: &str = "Event tracked successfully";

/// Loosely-typed request body. Every field is optional and carried through
/// as whatever JSON the caller sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub event_type: Option<Value>,
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub url: Option<Value>,
    #[serde(default)]
    pub properties: Option<Value>,
}

impl EventPayload {
    /// Empty bodies and JSON values that are not objects yield an empty payload.
    /// Bytes that are not JSON at all are an error.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        match serde_json::from_slice::<Value>(body)? {
            object @ Value::Object(_) => serde_json::from_value(object),
            _ => Ok(Self::default()),
        }
    }
}

/// The row written to `analytics.events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    pub properties: String,
}

impl EventRecord {
    pub fn new(
        payload: EventPayload,
        received_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let properties = match payload.properties {
            Some(value) if is_truthy(&value) => serde_json::to_string(&value)?,
            _ => "{}".to_owned(),
        };

        Ok(Self {
            timestamp: received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type: payload.event_type,
            user_id: payload.user_id,
            session_id: payload.session_id,
            url: payload.url,
            properties,
        })
    }
}

// `null`, `false`, `0` and `""` fall back to an empty properties object.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    pub message: &'static str,
}

impl TrackResponse {
    pub fn tracked() -> Self {
        Self {
            success: true,
            message: TRACKED_MESSAGE,
        }
    }
}
