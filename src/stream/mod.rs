pub mod converter;
mod reasoning;
pub mod sse;

pub use converter::StreamConverter;
pub use sse::SseParser;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

/// The payload of one upstream `data:` line.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub data: String,
}

struct ConvertState<S> {
    upstream: Pin<Box<S>>,
    parser: SseParser,
    events: Vec<SseEvent>,
    converter: StreamConverter,
    done: bool,
}

/// Drive `converter` over an upstream `OpenAI` SSE body, yielding Anthropic
/// SSE bytes as they become available.
///
/// Reading is pull-based: nothing is read from the upstream until the
/// consumer asks for more, and dropping the returned stream drops the
/// upstream body. Reading stops once the converter has written
/// `message_stop`.
pub fn convert_stream<S, E>(upstream: S, converter: StreamConverter) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = ConvertState {
        upstream: Box::pin(upstream),
        parser: SseParser::new(),
        events: Vec::with_capacity(8),
        converter,
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            let mut out = String::new();
            match state.upstream.as_mut().next().await {
                Some(Ok(bytes)) => {
                    state.parser.feed_bytes_into(&bytes, &mut state.events);
                    drain_events(&mut state, &mut out);
                    if state.converter.is_closed() {
                        state.done = true;
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "upstream stream failed mid-response");
                    drain_events(&mut state, &mut out);
                    state
                        .converter
                        .fail(&format!("upstream stream error: {err}"), &mut out);
                    state.done = true;
                }
                None => {
                    state.parser.finish_into(&mut state.events);
                    drain_events(&mut state, &mut out);
                    state.converter.finish_at_eof(&mut out);
                    state.done = true;
                }
            }
            if !out.is_empty() {
                return Some((Bytes::from(out), state));
            }
        }
    })
}

fn drain_events<S>(state: &mut ConvertState<S>, out: &mut String) {
    for event in state.events.drain(..) {
        state.converter.process_data(&event.data, out);
    }
}
