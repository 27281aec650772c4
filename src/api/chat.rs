use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::error::RelayError;
use crate::protocol::cohere::remap_request;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::state::AppState;
use crate::stream::{build_completion_response, build_stream_response, ChunkContext, StreamSession};

use super::cors::{apply_cors_headers, apply_preflight_headers};

const UPSTREAM_ERROR_LOG_LIMIT: usize = 1024;

/// `POST /v1/chat/completions`.
pub async fn handler(
    state: Arc<AppState>,
    headers: HeaderMap,
    query: Option<&str>,
    body: bytes::Bytes,
) -> Response {
    let mut response = match handler_inner(&state, &headers, query, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat request failed before upstream reply");
            err.into_response()
        }
    };
    if state.config.features.cors {
        apply_cors_headers(response.headers_mut());
    }
    response
}

/// `OPTIONS /v1/chat/completions`.
#[must_use]
pub fn preflight(state: &AppState) -> Response {
    let mut response = Response::new(axum::body::Body::empty());
    *response.status_mut() = http::StatusCode::NO_CONTENT;
    if state.config.features.cors {
        apply_preflight_headers(response.headers_mut());
    }
    response
}

async fn handler_inner(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
    body: bytes::Bytes,
) -> Result<Response, RelayError> {
    let request: OpenAiChatRequest = serde_json::from_slice(&body)
        .map_err(|err| RelayError::InvalidRequest(format!("Invalid chat request: {err}")))?;
    let upstream = &state.config.upstream;
    let cohere = remap_request(request, &upstream.model_prefix, &upstream.default_model);
    let stream = cohere.stream;
    let ctx = ChunkContext::new(cohere.model.clone());
    let upstream_body = serde_json::to_vec(&cohere)
        .map(bytes::Bytes::from)
        .map_err(|err| RelayError::Internal(format!("Failed to encode upstream request: {err}")))?;

    let authorization = state.key_rotator.upstream_authorization(headers, query);
    tracing::debug!(model = ctx.model(), stream, "forwarding chat request");
    let response = state.transport.send_chat(&authorization, upstream_body).await?;

    if response.status() != reqwest::StatusCode::OK {
        return passthrough_upstream_error(response).await;
    }

    if stream {
        let session = StreamSession::new(ctx, upstream.max_pending_bytes);
        return Ok(build_stream_response(response.bytes_stream(), session));
    }

    let body = response
        .bytes()
        .await
        .map_err(|err| RelayError::Transport(format!("Failed to read upstream body: {err}")))?;
    build_completion_response(&ctx, &body)
}

/// Hand a non-200 upstream reply back unchanged: status, content type and body.
async fn passthrough_upstream_error(response: reqwest::Response) -> Result<Response, RelayError> {
    let status = response.status();
    let content_type = response.headers().get(http::header::CONTENT_TYPE).cloned();
    let body = response
        .bytes()
        .await
        .map_err(|err| RelayError::Transport(format!("Failed to read upstream body: {err}")))?;

    let preview_len = body.len().min(UPSTREAM_ERROR_LOG_LIMIT);
    tracing::error!(
        status = status.as_u16(),
        body = %String::from_utf8_lossy(&body[..preview_len]),
        "upstream returned an error status"
    );

    let mut passthrough = Response::new(axum::body::Body::from(body));
    *passthrough.status_mut() = status;
    if let Some(content_type) = content_type {
        passthrough
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, content_type);
    }
    Ok(passthrough)
}
