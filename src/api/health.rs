use std::sync::Arc;

use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(state: &Arc<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "cohere-relay is running",
        "config": {
            "upstream": state.transport.chat_url().as_str(),
            "default_model": config.upstream.default_model,
            "proxy": config.upstream.proxy.is_some(),
            "features": {
                "log_level": config.features.log_level,
                "cors": config.features.cors,
            }
        }
    }))
}
