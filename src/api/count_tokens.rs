use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::error::{into_axum_response, BridgeError};
use crate::observability::token_counter::estimate_request_tokens;
use crate::protocol::anthropic::AnthropicRequest;
use crate::state::AppState;

/// `POST /v1/messages/count_tokens`: local estimate, the upstream is never called.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match count(&state, &headers, &body) {
        Ok(input_tokens) => Json(json!({ "input_tokens": input_tokens })).into_response(),
        Err(err) => into_axum_response(&err),
    }
}

fn count(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<u64, BridgeError> {
    state.authenticate(headers)?;
    let request: AnthropicRequest = serde_json::from_slice(body)
        .map_err(|err| BridgeError::InvalidRequest(format!("Invalid request body: {err}")))?;
    Ok(estimate_request_tokens(&request))
}
