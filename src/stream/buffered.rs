//! Non-streaming responder: the whole upstream body in, one completion out.

use axum::response::Response;
use bytes::Bytes;

use crate::error::RelayError;

use super::chunk::ChunkContext;
use super::decode::decode_bytes;
use super::delta::extract_delta;
use super::recover::scan_records;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Concatenated deltas of every record recoverable from `body`, in order.
///
/// A body with no recoverable record yields an empty string.
#[must_use]
pub fn collect_content(body: &[u8]) -> String {
    let decoded = decode_bytes(body);
    let outcome = scan_records(&decoded.text);
    if outcome.records.is_empty() && !body.is_empty() {
        tracing::warn!(
            body_len = body.len(),
            encoding = decoded.encoding.name(),
            "no complete record in upstream body"
        );
    }

    let mut content = String::new();
    for record in &outcome.records {
        if let Some(delta) = extract_delta(record) {
            content.push_str(&delta);
        }
    }
    content
}

/// Serialize the single `chat.completion` object for a buffered upstream body.
///
/// # Errors
///
/// Returns [`RelayError::Internal`] if the completion cannot be serialized.
pub fn encode_completion(ctx: &ChunkContext, body: &[u8]) -> Result<Bytes, RelayError> {
    let content = collect_content(body);
    let completion = ctx.wrap_completion(&content);
    serde_json::to_vec(&completion)
        .map(Bytes::from)
        .map_err(|err| RelayError::Internal(format!("failed to encode completion: {err}")))
}

/// Build the `200 application/json` response for a buffered upstream body.
///
/// # Errors
///
/// See [`encode_completion`].
pub fn build_completion_response(ctx: &ChunkContext, body: &[u8]) -> Result<Response, RelayError> {
    let bytes = encode_completion(ctx, body)?;
    let mut response = Response::new(axum::body::Body::from(bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(body: &[u8]) -> serde_json::Value {
        let ctx = ChunkContext::with_created("command-r", 7);
        serde_json::from_slice(&encode_completion(&ctx, body).unwrap()).unwrap()
    }

    #[test]
    fn test_deltas_concatenate_in_order() {
        let value = completion(br#"{"text":"Hi"}{"text":" there"}"#);
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["delta"]["content"], "Hi there");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["created"], 7);
    }

    #[test]
    fn test_event_stream_body_with_metadata_records() {
        let body = concat!(
            "{\"is_finished\":false,\"event_type\":\"stream-start\",\"generation_id\":\"g\"}\n",
            "{\"is_finished\":false,\"event_type\":\"text-generation\",\"text\":\"Hi\"}\n",
            "{\"is_finished\":true,\"event_type\":\"stream-end\",\"finish_reason\":\"COMPLETE\"}\n",
        );
        let value = completion(body.as_bytes());
        assert_eq!(value["choices"][0]["delta"]["content"], "Hi");
    }

    #[test]
    fn test_error_record_becomes_content() {
        let value = completion(br#"{"error":"rate limited"}"#);
        assert_eq!(value["choices"][0]["delta"]["content"], "rate limited");
    }

    #[test]
    fn test_unrecoverable_body_yields_empty_content() {
        assert_eq!(collect_content(b"<html>bad gateway</html>"), "");
        let value = completion(b"");
        assert_eq!(value["choices"][0]["delta"]["content"], "");
    }

    #[test]
    fn test_response_headers() {
        let ctx = ChunkContext::with_created("command-r", 7);
        let response = build_completion_response(&ctx, br#"{"text":"x"}"#).unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            JSON_CONTENT_TYPE
        );
    }
}
