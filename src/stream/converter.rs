use std::time::Instant;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::protocol::anthropic::stream::encode_anthropic_stream_event_into;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicDelta, AnthropicErrorBody, AnthropicMessageDeltaBody,
    AnthropicResponse, AnthropicStreamEvent, AnthropicUsage,
};
use crate::observability::log_request_complete;
use crate::protocol::mapping::{
    openai_finish_to_anthropic_stop, openai_usage_to_anthropic, openai_usage_to_anthropic_delta,
};
use crate::protocol::openai_chat::{OpenAiStreamChunk, OpenAiStreamToolCall, OpenAiUsage};
use crate::util::next_tool_use_id;

use super::reasoning::{ReasoningExtractor, Segments, TextSegment};

/// Per-request state turning `OpenAI` chat-completion chunks into Anthropic
/// stream events.
///
/// Every method appends encoded SSE frames to the caller's buffer. The
/// converter emits `message_start` once before anything else and
/// `message_stop` once after every block has been closed.
pub struct StreamConverter {
    message_id: String,
    model: String,
    lifecycle: Lifecycle,
    next_block_index: usize,
    text_block: Option<usize>,
    reasoning_block: Option<usize>,
    extractor: ReasoningExtractor,
    tool_calls: FxHashMap<u32, ToolCallState>,
    usage: Option<OpenAiUsage>,
    counters: ChunkCounters,
    started_at: Option<Instant>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Lifecycle {
    started: bool,
    finished: bool,
    closed: bool,
    pending_stop: Option<&'static str>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ChunkCounters {
    total: u64,
    content: u64,
    tool: u64,
}

#[derive(Debug)]
struct ToolCallState {
    id: String,
    name: String,
    arguments: String,
    block_index: usize,
}

impl StreamConverter {
    #[must_use]
    pub fn new(message_id: String) -> Self {
        Self {
            message_id,
            model: "unknown".to_string(),
            lifecycle: Lifecycle::default(),
            next_block_index: 0,
            text_block: None,
            reasoning_block: None,
            extractor: ReasoningExtractor::default(),
            tool_calls: FxHashMap::default(),
            usage: None,
            counters: ChunkCounters::default(),
            started_at: None,
        }
    }

    /// Log a completion line with usage and latency when the message finishes.
    #[must_use]
    pub fn with_start_time(mut self, started_at: Instant) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// True once `message_stop` or an `error` event has been written.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifecycle.closed
    }

    /// Process one upstream `data:` payload.
    ///
    /// `[DONE]` completes a message still waiting for usage and is otherwise a
    /// no-op; payloads that are not valid chunk JSON are logged and skipped.
    pub fn process_data(&mut self, data: &str, out: &mut String) {
        let data = data.trim();
        if data == "[DONE]" {
            self.complete(out);
            return;
        }
        if data.is_empty() {
            return;
        }
        match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => self.process_chunk(&chunk, out),
            Err(err) => {
                tracing::warn!(payload = %data, error = %err, "skipping malformed upstream stream chunk");
            }
        }
    }

    /// Process one parsed upstream chunk.
    ///
    /// After the finish reason only a usage-only chunk is still read; it
    /// fills in the counts for `message_delta`.
    pub fn process_chunk(&mut self, chunk: &OpenAiStreamChunk, out: &mut String) {
        if self.lifecycle.finished {
            if let Some(usage) = chunk.usage.as_ref() {
                self.usage = Some(usage.clone());
                self.complete(out);
            }
            return;
        }
        self.counters.total += 1;

        if let Some(model) = chunk.model.as_deref().filter(|model| !model.is_empty()) {
            if model != self.model {
                self.model = model.to_string();
            }
        }
        self.ensure_started(out);

        if let Some(usage) = chunk.usage.as_ref() {
            self.usage = Some(usage.clone());
        }

        let Some(choice) = chunk.choices.first() else {
            return;
        };
        let delta = &choice.delta;

        if let Some(reasoning) = delta.reasoning_text() {
            self.counters.content += 1;
            self.push_native_reasoning(reasoning, out);
        }
        if let Some(signature) = delta.reasoning_signature() {
            self.push_reasoning_signature(signature, out);
        }

        if let Some(text) = delta.content.as_deref().filter(|text| !text.is_empty()) {
            self.counters.content += 1;
            let segments = self.extractor.push(text);
            self.apply_segments(segments, out);
        }

        if let Some(tool_calls) = delta.tool_calls.as_deref().filter(|calls| !calls.is_empty()) {
            self.counters.tool += 1;
            let mut seen: SmallVec<[u32; 4]> = SmallVec::new();
            for call in tool_calls {
                if seen.contains(&call.index) {
                    continue;
                }
                seen.push(call.index);
                self.push_tool_call(call, out);
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            self.finish(reason, out);
        }
    }

    /// The upstream body ended. Without a finish reason the message is closed
    /// as `end_turn`, so the stream still ends in `message_stop`.
    pub fn finish_at_eof(&mut self, out: &mut String) {
        if self.lifecycle.closed {
            return;
        }
        if self.lifecycle.finished {
            self.complete(out);
            return;
        }
        self.ensure_started(out);
        tracing::debug!(
            chunks = self.counters.total,
            "upstream stream ended without a finish reason"
        );
        self.finish("stop", out);
        self.complete(out);
    }

    /// The upstream body failed mid-stream. Once the finish reason has been
    /// seen only usage was outstanding, so the message completes normally.
    pub fn fail(&mut self, message: &str, out: &mut String) {
        if self.lifecycle.closed {
            return;
        }
        if self.lifecycle.finished {
            tracing::debug!(error = %message, "upstream failed after finish reason, completing message");
            self.complete(out);
            return;
        }
        self.lifecycle.finished = true;
        self.lifecycle.closed = true;
        self.emit(
            out,
            &AnthropicStreamEvent::Error {
                error: AnthropicErrorBody {
                    type_: "api_error".to_string(),
                    message: message.to_string(),
                },
            },
        );
    }

    fn emit(&self, out: &mut String, event: &AnthropicStreamEvent) {
        encode_anthropic_stream_event_into(event, out);
    }

    fn ensure_started(&mut self, out: &mut String) {
        if self.lifecycle.started {
            return;
        }
        self.lifecycle.started = true;
        let message = AnthropicResponse {
            id: self.message_id.clone(),
            type_: "message".to_string(),
            role: "assistant".to_string(),
            model: self.model.clone(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: AnthropicUsage::default(),
        };
        self.emit(out, &AnthropicStreamEvent::MessageStart { message });
    }

    fn allocate_block(&mut self) -> usize {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }

    fn close_block(&self, index: usize, out: &mut String) {
        self.emit(out, &AnthropicStreamEvent::ContentBlockStop { index });
    }

    fn close_text_block(&mut self, out: &mut String) {
        if let Some(index) = self.text_block.take() {
            self.close_block(index, out);
        }
    }

    fn close_reasoning_block(&mut self, out: &mut String) {
        if let Some(index) = self.reasoning_block.take() {
            self.close_block(index, out);
        }
    }

    fn push_text(&mut self, text: String, out: &mut String) {
        self.close_reasoning_block(out);
        let index = match self.text_block {
            Some(index) => index,
            None => {
                let index = self.allocate_block();
                self.text_block = Some(index);
                self.emit(
                    out,
                    &AnthropicStreamEvent::ContentBlockStart {
                        index,
                        content_block: AnthropicContentBlock::Text {
                            text: String::new(),
                        },
                    },
                );
                index
            }
        };
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicDelta::TextDelta { text },
            },
        );
    }

    /// A complete reasoning segment pulled out of tagged text.
    fn push_thinking_segment(&mut self, thinking: String, out: &mut String) {
        self.close_text_block(out);
        self.close_reasoning_block(out);
        let index = self.allocate_block();
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: AnthropicContentBlock::Thinking {
                    thinking: String::new(),
                    signature: None,
                },
            },
        );
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicDelta::ThinkingDelta { thinking },
            },
        );
        self.close_block(index, out);
    }

    fn apply_segments(&mut self, segments: Segments, out: &mut String) {
        for segment in segments {
            match segment {
                TextSegment::Text(text) => self.push_text(text, out),
                TextSegment::Thinking(thinking) => self.push_thinking_segment(thinking, out),
            }
        }
    }

    fn open_reasoning_block(&mut self, out: &mut String) -> usize {
        if let Some(index) = self.reasoning_block {
            return index;
        }
        let held = self.extractor.flush_text();
        self.apply_segments(held, out);
        self.close_text_block(out);
        self.extractor.disable();
        let index = self.allocate_block();
        self.reasoning_block = Some(index);
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: AnthropicContentBlock::Thinking {
                    thinking: String::new(),
                    signature: None,
                },
            },
        );
        index
    }

    fn push_native_reasoning(&mut self, reasoning: &str, out: &mut String) {
        let index = self.open_reasoning_block(out);
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicDelta::ThinkingDelta {
                    thinking: reasoning.to_string(),
                },
            },
        );
    }

    fn push_reasoning_signature(&mut self, signature: &str, out: &mut String) {
        let index = self.open_reasoning_block(out);
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicDelta::SignatureDelta {
                    signature: signature.to_string(),
                },
            },
        );
    }

    fn push_tool_call(&mut self, call: &OpenAiStreamToolCall, out: &mut String) {
        let function = call.function.as_ref();
        let name = function
            .and_then(|function| function.name.as_deref())
            .filter(|name| !name.is_empty());
        let id = call.id.as_deref().filter(|id| !id.is_empty());

        let block_index = if let Some(state) = self.tool_calls.get_mut(&call.index) {
            if let Some(id) = id {
                if state.id != id {
                    state.id = id.to_string();
                }
            }
            if let Some(name) = name {
                if state.name != name {
                    state.name = name.to_string();
                }
            }
            state.block_index
        } else {
            self.open_tool_block(call.index, id, name, out)
        };

        let Some(fragment) = function
            .and_then(|function| function.arguments.as_deref())
            .filter(|arguments| !arguments.is_empty())
        else {
            return;
        };
        if let Some(state) = self.tool_calls.get_mut(&call.index) {
            state.arguments.push_str(fragment);
        }
        let partial_json = if needs_sanitizing(fragment) {
            tracing::warn!(
                tool_index = call.index,
                "tool argument fragment has control characters, sanitizing"
            );
            sanitize_partial_json(fragment)
        } else {
            fragment.to_string()
        };
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockDelta {
                index: block_index,
                delta: AnthropicDelta::InputJsonDelta { partial_json },
            },
        );
    }

    fn open_tool_block(
        &mut self,
        source_index: u32,
        id: Option<&str>,
        name: Option<&str>,
        out: &mut String,
    ) -> usize {
        if !self.extractor.is_inside_tag() {
            let held = self.extractor.flush_text();
            self.apply_segments(held, out);
        }
        self.close_text_block(out);
        self.close_reasoning_block(out);

        let block_index = self.allocate_block();
        let state = ToolCallState {
            id: id.map_or_else(next_tool_use_id, str::to_string),
            name: name.map_or_else(|| format!("tool_{source_index}"), str::to_string),
            arguments: String::new(),
            block_index,
        };
        self.emit(
            out,
            &AnthropicStreamEvent::ContentBlockStart {
                index: block_index,
                content_block: AnthropicContentBlock::ToolUse {
                    id: state.id.clone(),
                    name: state.name.clone(),
                    input: serde_json::Value::Object(serde_json::Map::new()),
                },
            },
        );
        self.tool_calls.insert(source_index, state);
        block_index
    }

    fn finish(&mut self, reason: &str, out: &mut String) {
        if self.lifecycle.finished {
            return;
        }
        self.lifecycle.finished = true;

        let held = self.extractor.finish();
        self.apply_segments(held, out);

        let mut open_blocks: SmallVec<[usize; 4]> = self
            .tool_calls
            .values()
            .map(|state| state.block_index)
            .collect();
        open_blocks.extend(self.reasoning_block.take());
        open_blocks.extend(self.text_block.take());
        open_blocks.sort_unstable();
        for index in open_blocks {
            self.close_block(index, out);
        }

        if self.counters.content == 0 && self.counters.tool == 0 {
            tracing::warn!(
                chunks = self.counters.total,
                finish_reason = reason,
                "upstream stream finished without any content"
            );
        }
        for state in self.tool_calls.values() {
            tracing::debug!(
                id = %state.id,
                name = %state.name,
                argument_bytes = state.arguments.len(),
                "streamed tool call"
            );
        }

        self.lifecycle.pending_stop = Some(openai_finish_to_anthropic_stop(reason));
        if self.usage.is_some() {
            self.complete(out);
        }
    }

    /// Emit `message_delta` and `message_stop` for a finished message.
    fn complete(&mut self, out: &mut String) {
        let Some(stop_reason) = self.lifecycle.pending_stop.take() else {
            return;
        };
        self.emit(
            out,
            &AnthropicStreamEvent::MessageDelta {
                delta: AnthropicMessageDeltaBody {
                    stop_reason: Some(stop_reason.to_string()),
                    stop_sequence: None,
                },
                usage: openai_usage_to_anthropic_delta(self.usage.as_ref()),
            },
        );
        self.emit(out, &AnthropicStreamEvent::MessageStop {});
        self.lifecycle.closed = true;

        if let Some(started_at) = self.started_at {
            log_request_complete(
                &self.model,
                &openai_usage_to_anthropic(self.usage.as_ref()),
                started_at,
            );
        }
    }
}

/// Control characters other than JSON whitespace can never appear in valid
/// JSON text.
fn needs_sanitizing(fragment: &str) -> bool {
    fragment
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

/// Lossy repair for argument fragments that cannot be forwarded as-is: strip
/// control characters, then escape backslashes and quotes. The result is not
/// guaranteed to reassemble into the JSON the model intended.
pub(crate) fn sanitize_partial_json(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 8);
    for c in fragment.chars() {
        match c {
            c if c.is_control() => {}
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}
