pub mod response_encoder;
pub mod stream;

use serde::{Deserialize, Serialize};

/// Anthropic Messages API request wire type.
///
/// Also used for `count_tokens`, which omits `max_tokens`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<AnthropicSystemPrompt>,
    #[serde(default)]
    pub messages: Vec<AnthropicMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnthropicMetadata>,
}

impl AnthropicRequest {
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// `system` accepts a bare string or an array of text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicSystemPrompt {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

/// Request metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Anthropic message wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    #[serde(default = "empty_message_content")]
    pub content: AnthropicMessageContent,
}

fn empty_message_content() -> AnthropicMessageContent {
    AnthropicMessageContent::Blocks(Vec::new())
}

/// Message content: a plain string or an ordered list of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicMessageContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

/// A typed content block, used in requests, responses and stream starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        #[serde(default)]
        data: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<AnthropicToolResultContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    WebSearchToolResult {
        tool_use_id: String,
        content: Vec<AnthropicWebSearchResult>,
    },
    /// Block kinds this bridge does not translate (documents, containers, ...).
    #[serde(other)]
    Unsupported,
}

/// Image payload source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
    #[serde(other)]
    Unsupported,
}

/// `tool_result.content`: a string or nested blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicToolResultContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

/// One entry of a `web_search_tool_result` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicWebSearchResult {
    #[serde(rename = "type")]
    pub type_: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub encrypted_content: String,
    #[serde(default)]
    pub page_age: Option<String>,
}

/// Anthropic tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// Anthropic Messages API response wire type; also the `message_start` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub role: String,
    pub model: String,
    pub content: Vec<AnthropicContentBlock>,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: AnthropicUsage,
}

/// Anthropic usage. Fields the upstream never reports serialize as `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
    pub server_tool_use: Option<AnthropicServerToolUsage>,
    pub service_tier: Option<String>,
}

/// Server tool usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicServerToolUsage {
    pub web_search_requests: u64,
}

/// Usage carried by `message_delta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicDeltaUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anthropic SSE stream event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicResponse,
    },
    ContentBlockStart {
        index: usize,
        content_block: AnthropicContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: AnthropicDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: AnthropicMessageDeltaBody,
        usage: AnthropicDeltaUsage,
    },
    MessageStop {},
    Error {
        error: AnthropicErrorBody,
    },
}

impl AnthropicStreamEvent {
    /// SSE `event:` name for this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            AnthropicStreamEvent::MessageStart { .. } => "message_start",
            AnthropicStreamEvent::ContentBlockStart { .. } => "content_block_start",
            AnthropicStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            AnthropicStreamEvent::ContentBlockStop { .. } => "content_block_stop",
            AnthropicStreamEvent::MessageDelta { .. } => "message_delta",
            AnthropicStreamEvent::MessageStop {} => "message_stop",
            AnthropicStreamEvent::Error { .. } => "error",
        }
    }
}

/// Delta variants for content block deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
}

/// Message delta body (`stop_reason` etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessageDeltaBody {
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
}

/// Error body in stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_string_and_block_content() {
        let req: AnthropicRequest = serde_json::from_value(serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 64,
            "system": [{"type": "text", "text": "be brief"}],
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": [
                    {"type": "text", "text": "calling"},
                    {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": 1}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "ok"}]},
                    {"type": "document", "source": {"type": "text", "data": "ignored"}}
                ]}
            ]
        }))
        .unwrap();

        assert!(matches!(req.system, Some(AnthropicSystemPrompt::Blocks(_))));
        assert!(matches!(
            req.messages[0].content,
            AnthropicMessageContent::Text(_)
        ));
        let AnthropicMessageContent::Blocks(blocks) = &req.messages[2].content else {
            panic!("expected blocks");
        };
        assert!(matches!(blocks[0], AnthropicContentBlock::ToolResult { .. }));
        assert!(matches!(blocks[1], AnthropicContentBlock::Unsupported));
        assert!(!req.is_stream());
    }

    #[test]
    fn test_usage_serializes_explicit_nulls() {
        let json = serde_json::to_value(AnthropicUsage {
            input_tokens: 3,
            output_tokens: 4,
            ..AnthropicUsage::default()
        })
        .unwrap();
        assert_eq!(json["input_tokens"], 3);
        assert!(json.get("cache_creation_input_tokens").unwrap().is_null());
        assert!(json.get("cache_read_input_tokens").unwrap().is_null());
        assert!(json.get("server_tool_use").unwrap().is_null());
        assert!(json.get("service_tier").unwrap().is_null());
    }

    #[test]
    fn test_stream_event_type_names() {
        let event = AnthropicStreamEvent::ContentBlockDelta {
            index: 2,
            delta: AnthropicDelta::SignatureDelta {
                signature: "sig".to_string(),
            },
        };
        assert_eq!(event.event_type(), "content_block_delta");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_block_delta");
        assert_eq!(json["delta"]["type"], "signature_delta");
        assert_eq!(
            AnthropicStreamEvent::MessageStop {}.event_type(),
            "message_stop"
        );
    }
}
