use smallvec::SmallVec;

/// Tag pairs that wrap reasoning embedded in ordinary text.
const THINK_TAGS: [ThinkTag; 3] = [
    ThinkTag {
        open: "<thinking>",
        close: "</thinking>",
    },
    ThinkTag {
        open: "<reasoning>",
        close: "</reasoning>",
    },
    ThinkTag {
        open: "<thoughts>",
        close: "</thoughts>",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ThinkTag {
    open: &'static str,
    close: &'static str,
}

/// A piece of streamed text after reasoning extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TextSegment {
    Text(String),
    Thinking(String),
}

pub(crate) type Segments = SmallVec<[TextSegment; 3]>;

/// Pulls the first tagged reasoning segment out of streamed text.
///
/// Text that might still turn into an opening tag is held back, and so is
/// everything after an opening tag until its closer arrives. After one
/// segment has been extracted, tags pass through as ordinary text.
#[derive(Debug, Default)]
pub(crate) struct ReasoningExtractor {
    content_buffer: String,
    thinking_buffer: String,
    inside: Option<ThinkTag>,
    extracted: bool,
    trim_next: bool,
}

impl ReasoningExtractor {
    /// Stop looking for tags; the message's reasoning came from elsewhere.
    pub(crate) fn disable(&mut self) {
        self.extracted = true;
    }

    pub(crate) fn is_inside_tag(&self) -> bool {
        self.inside.is_some()
    }

    pub(crate) fn push(&mut self, delta: &str) -> Segments {
        let mut out = Segments::new();
        if self.extracted && self.inside.is_none() {
            let delta = if self.trim_next {
                let trimmed = delta.trim_start();
                self.trim_next = trimmed.is_empty();
                trimmed
            } else {
                delta
            };
            let mut text = std::mem::take(&mut self.content_buffer);
            text.push_str(delta);
            push_text(&mut out, text);
            return out;
        }

        if let Some(tag) = self.inside {
            self.thinking_buffer.push_str(delta);
            if let Some(close_at) = self.thinking_buffer.find(tag.close) {
                let rest = self.thinking_buffer[close_at + tag.close.len()..]
                    .trim_start()
                    .to_string();
                out.push(TextSegment::Thinking(
                    self.thinking_buffer[..close_at].trim().to_string(),
                ));
                self.trim_next = rest.is_empty();
                push_text(&mut out, rest);
                self.thinking_buffer.clear();
                self.inside = None;
                self.extracted = true;
            }
            return out;
        }

        self.content_buffer.push_str(delta);
        let Some((open_at, tag)) = find_open_tag(&self.content_buffer) else {
            let held = partial_open_tag_len(&self.content_buffer);
            let emit_len = self.content_buffer.len() - held;
            if emit_len > 0 {
                let emitted: String = self.content_buffer.drain(..emit_len).collect();
                push_text(&mut out, emitted);
            }
            return out;
        };

        let buffer = std::mem::take(&mut self.content_buffer);
        push_text(&mut out, buffer[..open_at].to_string());
        let after = &buffer[open_at + tag.open.len()..];
        if let Some(close_at) = after.find(tag.close) {
            out.push(TextSegment::Thinking(after[..close_at].trim().to_string()));
            let rest = after[close_at + tag.close.len()..].trim_start();
            self.trim_next = rest.is_empty();
            push_text(&mut out, rest.to_string());
            self.extracted = true;
        } else {
            self.thinking_buffer.push_str(after);
            self.inside = Some(tag);
        }
        out
    }

    /// Release everything still held at end of stream.
    ///
    /// An unterminated reasoning segment still becomes thinking.
    pub(crate) fn finish(&mut self) -> Segments {
        let mut out = Segments::new();
        if self.inside.take().is_some() {
            let thinking = std::mem::take(&mut self.thinking_buffer);
            out.push(TextSegment::Thinking(thinking.trim().to_string()));
            self.extracted = true;
        }
        push_text(&mut out, std::mem::take(&mut self.content_buffer));
        out
    }

    /// Release held plain text (not an open reasoning segment).
    pub(crate) fn flush_text(&mut self) -> Segments {
        let mut out = Segments::new();
        if self.inside.is_none() {
            push_text(&mut out, std::mem::take(&mut self.content_buffer));
        }
        out
    }
}

fn push_text(out: &mut Segments, text: String) {
    if !text.is_empty() {
        out.push(TextSegment::Text(text));
    }
}

fn find_open_tag(buffer: &str) -> Option<(usize, ThinkTag)> {
    THINK_TAGS
        .iter()
        .filter_map(|tag| buffer.find(tag.open).map(|at| (at, *tag)))
        .min_by_key(|(at, _)| *at)
}

/// Length of the longest buffer suffix that is a proper prefix of an opening tag.
fn partial_open_tag_len(buffer: &str) -> usize {
    THINK_TAGS
        .iter()
        .map(|tag| {
            (1..tag.open.len())
                .rev()
                .find(|&len| buffer.ends_with(&tag.open[..len]))
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0)
}
