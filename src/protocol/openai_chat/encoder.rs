use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMessageContent,
    AnthropicRequest, AnthropicSystemPrompt, AnthropicTool, AnthropicToolResultContent,
};

use super::{
    OpenAiChatRequest, OpenAiContentPart, OpenAiImageUrl, OpenAiMessage, OpenAiMessageContent,
    OpenAiStreamOptions, OpenAiTool, OpenAiToolCall, OpenAiToolCallFunction, OpenAiToolChoice,
    OpenAiToolChoiceFunction, OpenAiToolChoiceFunctionCall, OpenAiToolFunction,
};

/// Encode an Anthropic Messages request into the `OpenAI` Chat Completions wire format.
///
/// Tool results are moved so that each one directly follows the assistant
/// message carrying its tool call; results with no matching call are appended
/// at the end. Router hints from `upstream` are added as top-level fields.
/// Content this bridge cannot translate is skipped, so encoding never fails.
#[must_use]
pub fn encode_openai_chat_request(
    request: &AnthropicRequest,
    upstream: &UpstreamConfig,
) -> OpenAiChatRequest {
    let mut pending = PendingToolResults::collect(&request.messages);
    let mut messages: Vec<OpenAiMessage> =
        Vec::with_capacity(request.messages.len() + usize::from(request.system.is_some()));

    if let Some(system) = request.system.as_ref().and_then(system_prompt_text) {
        messages.push(OpenAiMessage::text("system", system));
    }

    for message in &request.messages {
        match message.role.as_str() {
            "assistant" => encode_assistant_message(message, &mut pending, &mut messages),
            "system" => {
                let text = message_text(&message.content);
                if !text.is_empty() {
                    messages.push(OpenAiMessage::text("system", text));
                }
            }
            _ => {
                if let Some(encoded) = encode_user_message(message) {
                    messages.push(encoded);
                }
            }
        }
    }

    let unmatched = pending.drain_remaining();
    if !unmatched.is_empty() {
        tracing::debug!(
            count = unmatched.len(),
            "appending tool results without a matching tool call"
        );
        messages.extend(unmatched);
    }

    let tools: Option<Vec<OpenAiTool>> = request
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(encode_tool).collect());
    let tool_choice = if tools.is_some() {
        request.tool_choice.as_ref().and_then(encode_tool_choice)
    } else {
        None
    };

    OpenAiChatRequest {
        model: upstream.resolve_model(&request.model).to_string(),
        messages,
        tools,
        tool_choice,
        stream: Some(request.is_stream()),
        stream_options: request.is_stream().then_some(OpenAiStreamOptions {
            include_usage: Some(true),
        }),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        stop: request
            .stop_sequences
            .clone()
            .filter(|stops| !stops.is_empty()),
        user: request
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.user_id.clone()),
        extra: upstream.hints.to_extra_fields(),
    }
}

/// Tool results keyed by `tool_use_id`, remembering first-seen order.
struct PendingToolResults {
    entries: Vec<(String, Vec<OpenAiMessage>)>,
    positions: FxHashMap<String, usize>,
}

impl PendingToolResults {
    fn collect(messages: &[AnthropicMessage]) -> Self {
        let mut pending = Self {
            entries: Vec::new(),
            positions: FxHashMap::default(),
        };
        for message in messages {
            let AnthropicMessageContent::Blocks(blocks) = &message.content else {
                continue;
            };
            for block in blocks {
                if let AnthropicContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } = block
                {
                    pending.push(tool_use_id, tool_result_text(content.as_ref()));
                }
            }
        }
        pending
    }

    fn push(&mut self, tool_use_id: &str, text: String) {
        let message = OpenAiMessage {
            tool_call_id: Some(tool_use_id.to_string()),
            ..OpenAiMessage::text("tool", text)
        };
        if let Some(&position) = self.positions.get(tool_use_id) {
            self.entries[position].1.push(message);
            return;
        }
        self.positions
            .insert(tool_use_id.to_string(), self.entries.len());
        self.entries.push((tool_use_id.to_string(), vec![message]));
    }

    fn take(&mut self, tool_use_id: &str) -> Vec<OpenAiMessage> {
        self.positions
            .remove(tool_use_id)
            .map(|position| std::mem::take(&mut self.entries[position].1))
            .unwrap_or_default()
    }

    fn drain_remaining(&mut self) -> Vec<OpenAiMessage> {
        self.positions.clear();
        self.entries
            .drain(..)
            .flat_map(|(_, messages)| messages)
            .collect()
    }
}

fn system_prompt_text(system: &AnthropicSystemPrompt) -> Option<String> {
    let text = match system {
        AnthropicSystemPrompt::Text(text) => text.clone(),
        AnthropicSystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter_map(block_text)
            .collect::<Vec<_>>()
            .join(" "),
    };
    (!text.is_empty()).then_some(text)
}

fn block_text(block: &AnthropicContentBlock) -> Option<&str> {
    match block {
        AnthropicContentBlock::Text { text } => Some(text.as_str()),
        _ => None,
    }
}

fn message_text(content: &AnthropicMessageContent) -> String {
    match content {
        AnthropicMessageContent::Text(text) => text.clone(),
        AnthropicMessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(block_text)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn tool_result_text(content: Option<&AnthropicToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(AnthropicToolResultContent::Text(text)) => text.clone(),
        Some(AnthropicToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(block_text)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn encode_user_message(message: &AnthropicMessage) -> Option<OpenAiMessage> {
    let blocks = match &message.content {
        AnthropicMessageContent::Text(text) => {
            return Some(OpenAiMessage::text("user", text.clone()));
        }
        AnthropicMessageContent::Blocks(blocks) => blocks,
    };

    let mut parts: Vec<OpenAiContentPart> = Vec::with_capacity(blocks.len());
    let mut has_image = false;
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => {
                parts.push(OpenAiContentPart::Text { text: text.clone() });
            }
            AnthropicContentBlock::Image { source } => {
                if let Some(url) = image_url(source) {
                    has_image = true;
                    parts.push(OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl { url },
                    });
                }
            }
            AnthropicContentBlock::ToolResult { .. }
            | AnthropicContentBlock::ToolUse { .. }
            | AnthropicContentBlock::Thinking { .. }
            | AnthropicContentBlock::RedactedThinking { .. }
            | AnthropicContentBlock::ServerToolUse { .. }
            | AnthropicContentBlock::WebSearchToolResult { .. }
            | AnthropicContentBlock::Unsupported => {}
        }
    }

    if parts.is_empty() {
        return None;
    }
    let content = if has_image {
        OpenAiMessageContent::Parts(parts)
    } else {
        OpenAiMessageContent::Text(
            parts
                .iter()
                .filter_map(|part| match part {
                    OpenAiContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };
    Some(OpenAiMessage {
        content: Some(content),
        ..OpenAiMessage::text("user", String::new())
    })
}

fn image_url(source: &AnthropicImageSource) -> Option<String> {
    match source {
        AnthropicImageSource::Base64 { media_type, data } => {
            Some(format!("data:{media_type};base64,{data}"))
        }
        AnthropicImageSource::Url { url } => Some(url.clone()),
        AnthropicImageSource::Unsupported => None,
    }
}

fn encode_assistant_message(
    message: &AnthropicMessage,
    pending: &mut PendingToolResults,
    out: &mut Vec<OpenAiMessage>,
) {
    let blocks = match &message.content {
        AnthropicMessageContent::Text(text) => {
            out.push(OpenAiMessage::text("assistant", text.clone()));
            return;
        }
        AnthropicMessageContent::Blocks(blocks) => blocks,
    };

    let mut texts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<OpenAiToolCall> = Vec::new();
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => texts.push(text),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(OpenAiToolCall {
                    id: id.clone(),
                    type_: "function".to_string(),
                    function: OpenAiToolCallFunction {
                        name: name.clone(),
                        arguments: tool_arguments(input),
                    },
                });
            }
            AnthropicContentBlock::Thinking { .. }
            | AnthropicContentBlock::RedactedThinking { .. }
            | AnthropicContentBlock::Image { .. }
            | AnthropicContentBlock::ToolResult { .. }
            | AnthropicContentBlock::ServerToolUse { .. }
            | AnthropicContentBlock::WebSearchToolResult { .. }
            | AnthropicContentBlock::Unsupported => {}
        }
    }

    if texts.is_empty() && tool_calls.is_empty() {
        return;
    }

    let content = if texts.is_empty() {
        None
    } else {
        Some(OpenAiMessageContent::Text(texts.join("\n")))
    };
    let call_ids: Vec<String> = tool_calls.iter().map(|call| call.id.clone()).collect();
    out.push(OpenAiMessage {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        ..OpenAiMessage::text("assistant", String::new())
    });
    for id in &call_ids {
        out.extend(pending.take(id));
    }
}

fn tool_arguments(input: &Value) -> String {
    match input {
        Value::Null => "{}".to_string(),
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn encode_tool(tool: &AnthropicTool) -> OpenAiTool {
    let parameters = if tool.input_schema.is_null() {
        serde_json::json!({"type": "object", "properties": {}})
    } else {
        tool.input_schema.clone()
    };
    OpenAiTool {
        type_: "function".to_string(),
        function: OpenAiToolFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: Some(parameters),
        },
    }
}

fn encode_tool_choice(choice: &Value) -> Option<OpenAiToolChoice> {
    let mode = match choice {
        Value::String(mode) => mode.as_str(),
        Value::Object(object) => object.get("type").and_then(Value::as_str)?,
        _ => return None,
    };
    match mode {
        "auto" => Some(OpenAiToolChoice::Mode("auto".to_string())),
        "any" | "required" => Some(OpenAiToolChoice::Mode("required".to_string())),
        "none" => Some(OpenAiToolChoice::Mode("none".to_string())),
        "tool" => {
            let name = choice.get("name").and_then(Value::as_str)?;
            Some(OpenAiToolChoice::Function(OpenAiToolChoiceFunctionCall {
                type_: "function".to_string(),
                function: OpenAiToolChoiceFunction {
                    name: name.to_string(),
                },
            }))
        }
        _ => None,
    }
}
