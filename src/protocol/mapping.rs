use super::anthropic::{AnthropicDeltaUsage, AnthropicUsage};
use super::openai_chat::OpenAiUsage;

// ---------------------------------------------------------------------------
// Stop reason mappings
// ---------------------------------------------------------------------------

/// Map an `OpenAI` `finish_reason` onto an Anthropic `stop_reason`.
///
/// Unrecognized reasons fall back to `end_turn`.
#[must_use]
pub fn openai_finish_to_anthropic_stop(reason: &str) -> &'static str {
    match reason {
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        "content_filter" => "stop_sequence",
        _ => "end_turn",
    }
}

// ---------------------------------------------------------------------------
// Usage mappings
// ---------------------------------------------------------------------------

/// Map upstream usage onto the full Anthropic usage object.
#[must_use]
pub fn openai_usage_to_anthropic(usage: Option<&OpenAiUsage>) -> AnthropicUsage {
    let Some(usage) = usage else {
        return AnthropicUsage::default();
    };
    AnthropicUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_read_input_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens),
        ..AnthropicUsage::default()
    }
}

/// Map upstream usage onto the `message_delta` usage counters.
#[must_use]
pub fn openai_usage_to_anthropic_delta(usage: Option<&OpenAiUsage>) -> AnthropicDeltaUsage {
    usage.map_or_else(AnthropicDeltaUsage::default, |usage| AnthropicDeltaUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    })
}
