use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary; secrets are never included.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "anthropic-bridge is running",
        "config": {
            "upstream_enabled": config.upstream.enabled,
            "upstream_endpoint": state.endpoint.url().as_str(),
            "model_map_entries": config.upstream.model_map.len(),
            "router_hints": !config.upstream.hints.is_empty(),
            "client_keys_count": config.client_authentication.allowed_keys.len(),
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}
