use std::time::Duration;

use tracing::info;

use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicMessageContent, AnthropicRequest, AnthropicSystemPrompt,
    AnthropicToolResultContent, AnthropicUsage,
};

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) instead of a tokenizer.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the input tokens of a Messages request.
///
/// Counts the system prompt, text-bearing blocks of every message, tool
/// arguments and results, and serialized tool definitions. Images are not
/// counted.
#[must_use]
pub fn estimate_request_tokens(request: &AnthropicRequest) -> u64 {
    let mut total: u64 = 0;

    match &request.system {
        Some(AnthropicSystemPrompt::Text(text)) => total += estimate_tokens(text),
        Some(AnthropicSystemPrompt::Blocks(blocks)) => total += estimate_blocks(blocks),
        None => {}
    }

    for message in &request.messages {
        total += match &message.content {
            AnthropicMessageContent::Text(text) => estimate_tokens(text),
            AnthropicMessageContent::Blocks(blocks) => estimate_blocks(blocks),
        };
    }

    for tool in request.tools.iter().flatten() {
        total += estimate_tokens(&tool.name);
        if let Some(description) = tool.description.as_deref() {
            total += estimate_tokens(description);
        }
        if let Ok(schema) = serde_json::to_string(&tool.input_schema) {
            total += estimate_tokens(&schema);
        }
    }

    total
}

fn estimate_blocks(blocks: &[AnthropicContentBlock]) -> u64 {
    blocks.iter().map(estimate_block).sum()
}

fn estimate_block(block: &AnthropicContentBlock) -> u64 {
    match block {
        AnthropicContentBlock::Text { text } => estimate_tokens(text),
        AnthropicContentBlock::Thinking { thinking, .. } => estimate_tokens(thinking),
        AnthropicContentBlock::ToolUse { input, .. }
        | AnthropicContentBlock::ServerToolUse { input, .. } => serde_json::to_string(input)
            .map(|raw| estimate_tokens(&raw))
            .unwrap_or_default(),
        AnthropicContentBlock::ToolResult { content, .. } => match content {
            Some(AnthropicToolResultContent::Text(text)) => estimate_tokens(text),
            Some(AnthropicToolResultContent::Blocks(blocks)) => estimate_blocks(blocks),
            None => 0,
        },
        AnthropicContentBlock::RedactedThinking { .. }
        | AnthropicContentBlock::Image { .. }
        | AnthropicContentBlock::WebSearchToolResult { .. }
        | AnthropicContentBlock::Unsupported => 0,
    }
}

/// Log token usage for a completed request at INFO level.
pub fn log_request_usage(model: &str, usage: &AnthropicUsage, duration: Duration) {
    info!(
        model = model,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        cached_tokens = usage.cache_read_input_tokens.unwrap_or(0),
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_request(value: serde_json::Value) -> AnthropicRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_counts_system_and_messages() {
        let request = parse_request(serde_json::json!({
            "model": "claude-sonnet-4-5",
            "system": "12345678",
            "messages": [
                {"role": "user", "content": "abcd"},
                {"role": "assistant", "content": [{"type": "text", "text": "abcdefgh"}]}
            ]
        }));
        assert_eq!(estimate_request_tokens(&request), 2 + 1 + 2);
    }

    #[test]
    fn test_estimate_counts_tools_and_results_but_not_images() {
        let request = parse_request(serde_json::json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": [
                    {"type": "image", "source": {"type": "url", "url": "https://example.com/a.png"}},
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "abcd"}
                ]}
            ],
            "tools": [{"name": "get", "input_schema": {}}]
        }));
        // "abcd" -> 1, "get" -> 1, "{}" -> 1
        assert_eq!(estimate_request_tokens(&request), 3);
    }
}
