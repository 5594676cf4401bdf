use super::AnthropicStreamEvent;
use crate::protocol::error_shapes::anthropic_stream_error_json;
use crate::stream::sse::anthropic_sse_frame;

/// Encode one stream event as a named SSE frame and append it to `out`.
///
/// Serialization of these types cannot fail in practice; if it ever does the
/// frame is replaced by an `error` event so the client still sees valid SSE.
pub fn encode_anthropic_stream_event_into(event: &AnthropicStreamEvent, out: &mut String) {
    match serde_json::to_string(event) {
        Ok(json) => out.push_str(&anthropic_sse_frame(event.event_type(), &json)),
        Err(err) => {
            tracing::error!(error = %err, event = event.event_type(), "failed to serialize stream event");
            out.push_str(&anthropic_sse_frame(
                "error",
                &anthropic_stream_error_json("failed to serialize stream event"),
            ));
        }
    }
}
