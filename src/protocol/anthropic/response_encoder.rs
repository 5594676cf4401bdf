use serde_json::Value;

use crate::error::BridgeError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicResponse, AnthropicWebSearchResult,
};
use crate::protocol::mapping::{openai_finish_to_anthropic_stop, openai_usage_to_anthropic};
use crate::protocol::openai_chat::{OpenAiAnnotation, OpenAiChatResponse, OpenAiToolCall};
use crate::util::next_server_tool_use_id;

/// Encode a complete `OpenAI` chat completion as an Anthropic message.
///
/// Only the first choice is used. `fallback_model` and `fallback_id` fill in
/// when the upstream leaves `model` or `id` empty.
///
/// # Errors
///
/// Returns [`BridgeError::Translation`] when the response has no choices.
pub fn encode_anthropic_response(
    response: &OpenAiChatResponse,
    fallback_model: &str,
    fallback_id: &str,
) -> Result<AnthropicResponse, BridgeError> {
    let choice = response.choices.first().ok_or_else(|| {
        BridgeError::Translation("upstream response contained no choices".to_string())
    })?;
    let message = &choice.message;

    let mut content = Vec::new();

    if let Some(reasoning) = message
        .reasoning_content
        .as_deref()
        .filter(|text| !text.is_empty())
    {
        content.push(AnthropicContentBlock::Thinking {
            thinking: reasoning.to_string(),
            signature: None,
        });
    }

    if let Some(text) = message
        .content
        .as_ref()
        .map(crate::protocol::openai_chat::OpenAiMessageContent::joined_text)
        .filter(|text| !text.is_empty())
    {
        content.push(AnthropicContentBlock::Text { text });
    }

    for call in message.tool_calls.iter().flatten() {
        content.push(tool_use_block(call));
    }

    if let Some(annotations) = message
        .annotations
        .as_deref()
        .filter(|annotations| !annotations.is_empty())
    {
        push_web_search_blocks(annotations, &mut content);
    }

    if content.is_empty() {
        content.push(AnthropicContentBlock::Text {
            text: String::new(),
        });
    }

    let stop_reason = openai_finish_to_anthropic_stop(choice.finish_reason.as_deref().unwrap_or("stop"));

    Ok(AnthropicResponse {
        id: if response.id.is_empty() {
            fallback_id.to_string()
        } else {
            response.id.clone()
        },
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: if response.model.is_empty() {
            fallback_model.to_string()
        } else {
            response.model.clone()
        },
        content,
        stop_reason: Some(stop_reason.to_string()),
        stop_sequence: None,
        usage: openai_usage_to_anthropic(response.usage.as_ref()),
    })
}

fn tool_use_block(call: &OpenAiToolCall) -> AnthropicContentBlock {
    let raw = call.function.arguments.as_str();
    let input = if raw.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str::<Value>(raw).unwrap_or_else(|err| {
            tracing::warn!(tool = %call.function.name, error = %err, "tool arguments are not valid JSON, wrapping raw text");
            serde_json::json!({ "text": raw })
        })
    };
    AnthropicContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input,
    }
}

fn push_web_search_blocks(annotations: &[OpenAiAnnotation], content: &mut Vec<AnthropicContentBlock>) {
    let results: Vec<AnthropicWebSearchResult> = annotations
        .iter()
        .filter_map(|annotation| annotation.url_citation.as_ref())
        .map(|citation| AnthropicWebSearchResult {
            type_: "web_search_result".to_string(),
            url: citation.url.clone(),
            title: citation
                .title
                .clone()
                .unwrap_or_else(|| citation.url.clone()),
            encrypted_content: String::new(),
            page_age: None,
        })
        .collect();
    if results.is_empty() {
        return;
    }
    let id = next_server_tool_use_id();
    content.push(AnthropicContentBlock::ServerToolUse {
        id: id.clone(),
        name: "web_search".to_string(),
        input: Value::Object(serde_json::Map::new()),
    });
    content.push(AnthropicContentBlock::WebSearchToolResult {
        tool_use_id: id,
        content: results,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> OpenAiChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_single_text_choice_with_stop() {
        let out = encode_anthropic_response(
            &response(json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })),
            "claude-sonnet-4-5",
            "msg_fallback",
        )
        .unwrap();
        assert_eq!(out.content.len(), 1);
        assert!(matches!(&out.content[0], AnthropicContentBlock::Text { text } if text == "hello"));
        assert_eq!(out.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(out.id, "chatcmpl-1");
        assert_eq!(out.model, "gpt-4o");
        assert_eq!(out.usage.input_tokens, 5);
        assert_eq!(out.usage.output_tokens, 2);

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["type"], "message");
        assert!(json["usage"]["cache_creation_input_tokens"].is_null());
        assert!(json["usage"]["server_tool_use"].is_null());
        assert!(json["usage"]["service_tier"].is_null());
        assert!(json["stop_sequence"].is_null());
    }

    #[test]
    fn test_no_choices_is_an_error() {
        let err = encode_anthropic_response(&response(json!({"id": "x", "choices": []})), "m", "id")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Translation(_)));
    }

    #[test]
    fn test_tool_calls_with_malformed_arguments() {
        let out = encode_anthropic_response(
            &response(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "good", "arguments": "{\"a\":1}"}},
                        {"id": "call_2", "type": "function", "function": {"name": "bad", "arguments": "{not json"}}
                    ]
                }, "finish_reason": "tool_calls"}]
            })),
            "claude-sonnet-4-5",
            "msg_fallback",
        )
        .unwrap();
        assert_eq!(out.id, "msg_fallback");
        assert_eq!(out.model, "claude-sonnet-4-5");
        assert_eq!(out.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(out.content.len(), 2);
        let AnthropicContentBlock::ToolUse { input, .. } = &out.content[0] else {
            panic!("expected tool_use");
        };
        assert_eq!(input, &json!({"a": 1}));
        let AnthropicContentBlock::ToolUse { id, input, .. } = &out.content[1] else {
            panic!("expected tool_use");
        };
        assert_eq!(id, "call_2");
        assert_eq!(input, &json!({"text": "{not json"}));
    }

    #[test]
    fn test_annotations_become_web_search_blocks() {
        let out = encode_anthropic_response(
            &response(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": "see sources",
                    "annotations": [
                        {"type": "url_citation", "url_citation": {"url": "https://a.example", "title": "A"}},
                        {"type": "url_citation", "url_citation": {"url": "https://b.example"}}
                    ]
                }, "finish_reason": "stop"}]
            })),
            "m",
            "id",
        )
        .unwrap();
        assert_eq!(out.content.len(), 3);
        let AnthropicContentBlock::ServerToolUse { id, name, .. } = &out.content[1] else {
            panic!("expected server_tool_use");
        };
        assert_eq!(name, "web_search");
        let AnthropicContentBlock::WebSearchToolResult { tool_use_id, content } = &out.content[2]
        else {
            panic!("expected web_search_tool_result");
        };
        assert_eq!(tool_use_id, id);
        assert_eq!(content.len(), 2);
        assert_eq!(content[0].title, "A");
        assert_eq!(content[1].title, "https://b.example");
    }

    #[test]
    fn test_reasoning_content_leads_with_thinking() {
        let out = encode_anthropic_response(
            &response(json!({
                "choices": [{"message": {"role": "assistant", "content": "42", "reasoning_content": "think"}, "finish_reason": "length"}]
            })),
            "m",
            "id",
        )
        .unwrap();
        assert!(matches!(&out.content[0], AnthropicContentBlock::Thinking { thinking, .. } if thinking == "think"));
        assert!(matches!(&out.content[1], AnthropicContentBlock::Text { .. }));
        assert_eq!(out.stop_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn test_empty_message_yields_empty_text_block() {
        let out = encode_anthropic_response(
            &response(json!({
                "choices": [{"message": {"role": "assistant", "content": ""}, "finish_reason": "content_filter"}]
            })),
            "m",
            "id",
        )
        .unwrap();
        assert_eq!(out.content.len(), 1);
        assert!(matches!(&out.content[0], AnthropicContentBlock::Text { text } if text.is_empty()));
        assert_eq!(out.stop_reason.as_deref(), Some("stop_sequence"));
        assert_eq!(out.usage.input_tokens, 0);
    }
}
