use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::StreamExt;

use crate::api::common::{ok_json_response, sse_ok_response, upstream_error_from_response};
use crate::error::{into_axum_response, BridgeError};
use crate::observability::log_request_complete;
use crate::protocol::anthropic::response_encoder::encode_anthropic_response;
use crate::protocol::anthropic::AnthropicRequest;
use crate::protocol::openai_chat::encoder::encode_openai_chat_request;
use crate::protocol::openai_chat::OpenAiChatResponse;
use crate::state::AppState;
use crate::stream::{convert_stream, StreamConverter};

/// `POST /v1/messages`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match handler_inner(state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err),
    }
}

async fn handler_inner(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, BridgeError> {
    let started_at = Instant::now();
    state.authenticate(headers)?;

    let request: AnthropicRequest = serde_json::from_slice(body)
        .map_err(|err| BridgeError::InvalidRequest(format!("Invalid request body: {err}")))?;
    if !state.config.upstream.enabled {
        return Err(BridgeError::Config(
            "upstream is disabled in configuration".to_string(),
        ));
    }

    let upstream_request = encode_openai_chat_request(&request, &state.config.upstream);
    let upstream_body = serde_json::to_vec(&upstream_request)
        .map_err(|err| BridgeError::Internal(format!("Failed to encode upstream request: {err}")))?;
    let message_id = state.next_message_id();
    let is_stream = request.is_stream();

    tracing::debug!(
        model = %request.model,
        upstream_model = %upstream_request.model,
        stream = is_stream,
        messages = upstream_request.messages.len(),
        tools = upstream_request.tools.as_ref().map_or(0, Vec::len),
        "forwarding request"
    );

    let response = state
        .transport
        .post_json(&state.endpoint, bytes::Bytes::from(upstream_body), is_stream)
        .await?;
    if !response.status().is_success() {
        return Err(upstream_error_from_response(response).await);
    }

    if is_stream {
        let converter = StreamConverter::new(message_id).with_start_time(started_at);
        let events = convert_stream(response.bytes_stream(), converter);
        return Ok(sse_ok_response(Body::from_stream(
            events.map(Ok::<_, Infallible>),
        )));
    }

    let upstream_bytes = response
        .bytes()
        .await
        .map_err(|err| BridgeError::Transport(format!("Failed to read upstream body: {err}")))?;
    let upstream_response: OpenAiChatResponse = serde_json::from_slice(&upstream_bytes)
        .map_err(|err| {
            BridgeError::Translation(format!("Invalid upstream response JSON: {err}"))
        })?;
    let message = encode_anthropic_response(&upstream_response, &request.model, &message_id)?;
    log_request_complete(&message.model, &message.usage, started_at);

    let encoded = serde_json::to_vec(&message)
        .map_err(|err| BridgeError::Internal(format!("Failed to encode response: {err}")))?;
    Ok(ok_json_response(bytes::Bytes::from(encoded)))
}
