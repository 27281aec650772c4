//! Outgoing SSE framing and response construction.

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;

use crate::protocol::openai_chat::ChatCompletionChunk;

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=UTF-8";

/// Serialize a chunk straight into one `data: <json>\n\n` frame.
///
/// # Errors
///
/// Returns the serializer error if the chunk cannot be encoded.
pub fn encode_chunk_frame(chunk: &ChatCompletionChunk<'_>) -> Result<Bytes, serde_json::Error> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(b"data: ");
    serde_json::to_writer(&mut out, chunk)?;
    out.extend_from_slice(b"\n\n");
    Ok(Bytes::from(out))
}

/// Wrap an event-stream body with the framing headers.
#[must_use]
pub fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChunkContext;

    #[test]
    fn test_encoded_frame_matches_string_form() {
        let ctx = ChunkContext::with_created("m", 1);
        let chunk = ctx.wrap("hi");
        let frame = encode_chunk_frame(&chunk).unwrap();
        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(frame, Bytes::from(format!("data: {json}\n\n")));
    }

    #[test]
    fn test_sse_response_headers() {
        let response = sse_ok_response(Body::empty());
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            EVENT_STREAM_CONTENT_TYPE
        );
        assert_eq!(response.headers()[http::header::CACHE_CONTROL], "no-cache");
    }
}
