//! `OpenAI` Chat Completions wire types: the inbound request and the outgoing
//! chunk envelope.

use serde::{Deserialize, Serialize};

/// Placeholder identifier carried by every outgoing chunk.
pub const CHUNK_ID: &str = "chatcmpl-9FLdP4Hj7KJ2BYYeskHyLALXnLzrY";
pub const OBJECT_CHUNK: &str = "chat.completion.chunk";
pub const OBJECT_COMPLETION: &str = "chat.completion";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const FINISH_STOP: &str = "stop";

/// `OpenAI` Chat Completion request wire type.
///
/// Only the fields the relay remaps are typed; everything else is kept verbatim
/// in `extra` and forwarded upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<OpenAiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `OpenAI` message wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl OpenAiMessage {
    /// Message content as plain text.
    ///
    /// Multi-part content is flattened to the concatenation of its text parts.
    #[must_use]
    pub fn content_text(&self) -> String {
        match &self.content {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(parts) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(serde_json::Value::as_str))
                .collect(),
            other => other.to_string(),
        }
    }
}

/// Outgoing chunk envelope, shared by streamed frames and buffered replies.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk<'a> {
    pub id: &'static str,
    pub object: &'static str,
    pub created: u64,
    pub model: &'a str,
    pub choices: [ChunkChoice<'a>; 1],
    pub usage: ChunkUsage,
    pub system_fingerprint: Option<&'a str>,
}

/// The single choice of a chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice<'a> {
    pub index: u32,
    pub delta: ChunkDelta<'a>,
    pub finish_reason: Option<&'static str>,
}

/// Role/content delta. Both fields are omitted on the terminal chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
}

/// Token usage block; the upstream reports none, so it is always zeroed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChunkUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_keeps_unknown_fields() {
        let req: OpenAiChatRequest = serde_json::from_str(
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}],"temperature":0.3}"#,
        )
        .unwrap();
        assert_eq!(req.model.as_deref(), Some("m"));
        assert_eq!(req.stream, None);
        assert_eq!(req.extra["temperature"], 0.3);
    }

    #[test]
    fn test_message_without_role_is_rejected() {
        let err = serde_json::from_str::<OpenAiChatRequest>(r#"{"messages":[{"content":"hi"}]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_content_text_flattens_parts() {
        let msg: OpenAiMessage = serde_json::from_str(
            r#"{"role":"user","content":[{"type":"text","text":"a"},{"type":"image_url","image_url":{"url":"x"}},{"type":"text","text":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.content_text(), "ab");
    }

    #[test]
    fn test_content_text_null_is_empty() {
        let msg: OpenAiMessage = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(msg.content_text(), "");
    }
}
