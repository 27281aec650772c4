//! Cohere chat wire types: the outbound request and the records the upstream
//! streams back.

pub mod request;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use request::remap_request;

/// Cohere `/v1/chat` request body.
///
/// `chat_history` is a list of `{"role", "message"}` turns, or whatever the
/// caller supplied explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereChatRequest {
    pub chat_history: Value,
    pub stream: bool,
    pub message: String,
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A JSON object recovered from the upstream body.
///
/// The upstream emits several event shapes; the relay only reads a handful of
/// fields, so the object is kept untyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamRecord(Map<String, Value>);

impl UpstreamRecord {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    /// `error` field, if present and not `null`.
    #[must_use]
    pub fn error(&self) -> Option<&Value> {
        self.0.get("error").filter(|value| !value.is_null())
    }

    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.0.get("event_type").and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.0
            .get("is_finished")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.0.get("finish_reason").and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for UpstreamRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
