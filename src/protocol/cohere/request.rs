use serde_json::{Map, Value};

use crate::protocol::openai_chat::{OpenAiChatRequest, OpenAiMessage};

use super::CohereChatRequest;

const ROLE_CHATBOT: &str = "CHATBOT";

/// Keys the remapper owns; any casing of these is not forwarded as-is.
fn is_remapped_key(key: &str) -> bool {
    ["model", "messages", "stream"]
        .iter()
        .any(|owned| key.eq_ignore_ascii_case(owned))
}

fn history_role(role: &str) -> String {
    if role == "assistant" {
        ROLE_CHATBOT.to_string()
    } else {
        role.to_uppercase()
    }
}

fn history_entry(message: &OpenAiMessage) -> Value {
    serde_json::json!({
        "role": history_role(&message.role),
        "message": message.content_text(),
    })
}

/// Resolve the upstream model: strip every occurrence of `prefix`, falling back
/// to `default_model` when nothing is left.
#[must_use]
pub fn resolve_model(requested: Option<&str>, prefix: &str, default_model: &str) -> String {
    let requested = requested.unwrap_or_default();
    let stripped = if prefix.is_empty() {
        requested.to_string()
    } else {
        requested.replace(prefix, "")
    };
    if stripped.is_empty() {
        default_model.to_string()
    } else {
        stripped
    }
}

/// Re-express an `OpenAI` chat request as a Cohere chat request.
///
/// All messages but the last become `chat_history`; the last one becomes
/// `message`. Unrecognised top-level fields pass through unchanged, and an
/// explicit `chat_history` among them replaces the derived one.
#[must_use]
pub fn remap_request(
    request: OpenAiChatRequest,
    model_prefix: &str,
    default_model: &str,
) -> CohereChatRequest {
    let OpenAiChatRequest {
        model,
        messages,
        stream,
        extra,
    } = request;

    let (message, history) = match messages.split_last() {
        Some((last, history)) => (last.content_text(), history),
        None => (String::new(), &[][..]),
    };

    let mut chat_history = Value::Array(history.iter().map(history_entry).collect());

    let mut passthrough = Map::with_capacity(extra.len());
    for (key, value) in extra {
        if is_remapped_key(&key) {
            continue;
        }
        match key.as_str() {
            "chat_history" => chat_history = value,
            // Derived below; the inbound value never wins.
            "message" | "model" => {}
            _ => {
                passthrough.insert(key, value);
            }
        }
    }

    CohereChatRequest {
        chat_history,
        stream: stream.unwrap_or(false),
        message,
        model: resolve_model(model.as_deref(), model_prefix, default_model),
        extra: passthrough,
    }
}
