use std::borrow::Cow;

use serde_json::Value;

use crate::protocol::cohere::UpstreamRecord;

/// Pull the next piece of assistant text out of an upstream record.
///
/// `text` wins when present; otherwise `error` is surfaced so upstream failures
/// reach the caller as visible text. Returns `None` when neither carries any
/// content, in which case no frame is emitted.
#[must_use]
pub fn extract_delta(record: &UpstreamRecord) -> Option<Cow<'_, str>> {
    let value = match record.get("text") {
        None | Some(Value::Null) => record.error()?,
        Some(text) => text,
    };

    let delta = match value {
        Value::Null => return None,
        Value::String(text) => Cow::Borrowed(text.as_str()),
        Value::Object(object) => match object.get("message") {
            Some(Value::String(message)) => Cow::Borrowed(message.as_str()),
            _ => Cow::Owned(value.to_string()),
        },
        other => Cow::Owned(other.to_string()),
    };

    (!delta.is_empty()).then_some(delta)
}
