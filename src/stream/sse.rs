/// SSE (Server-Sent Events) frame parser and encoder.
///
/// Parses upstream `data:` lines from raw body bytes that may arrive split
/// at any byte boundary, including inside a multi-byte UTF-8 sequence.
use memchr::memchr_iter;

use super::SseEvent;

// ---------------------------------------------------------------------------
// SseParser: incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw chunks and every complete `data:` line comes out as its own
/// [`SseEvent`]. Partial lines stay buffered until their newline arrives.
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    utf8_tail: Vec<u8>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            utf8_tail: Vec::new(),
        }
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    ///
    /// - each `data:` line is one payload (one leading space stripped), so
    ///   upstreams that separate frames with a single newline still work
    /// - `:` lines are comments
    /// - blank lines, `event:`, `id:`, `retry:` and unknown fields are ignored
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            process_line(line.strip_suffix('\r').unwrap_or(line), out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Feed raw body bytes.
    ///
    /// An incomplete UTF-8 sequence at the end of `bytes` is held until the
    /// next call; invalid sequences decode as U+FFFD.
    pub fn feed_bytes_into(&mut self, bytes: &[u8], out: &mut Vec<SseEvent>) {
        if self.utf8_tail.is_empty() {
            self.decode_into(bytes, out);
            return;
        }
        let mut joined = std::mem::take(&mut self.utf8_tail);
        joined.extend_from_slice(bytes);
        self.decode_into(&joined, out);
    }

    fn decode_into(&mut self, mut bytes: &[u8], out: &mut Vec<SseEvent>) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.feed_into(text, out);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.feed_into(text, out);
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.feed_into("\u{FFFD}", out);
                            bytes = &rest[len..];
                        }
                        None => {
                            self.utf8_tail.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Flush state at end of input: a trailing line without a newline is
    /// still dispatched.
    pub fn finish_into(&mut self, out: &mut Vec<SseEvent>) {
        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            let text = String::from_utf8_lossy(&tail).into_owned();
            self.feed_into(&text, out);
        }
        if self.read_offset < self.buffer.len() {
            let rest = std::mem::take(&mut self.buffer);
            let line = &rest[self.read_offset..];
            process_line(line.strip_suffix('\r').unwrap_or(line), out);
        }
        self.read_offset = 0;
    }
}

fn process_line(line: &str, events: &mut Vec<SseEvent>) {
    let Some(value) = line.strip_prefix("data:") else {
        return;
    };
    let value = value.strip_prefix(' ').unwrap_or(value);
    events.push(SseEvent {
        data: value.to_string(),
    });
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format an Anthropic-style SSE frame (with named event type).
#[must_use]
pub fn anthropic_sse_frame(event_type: &str, json: &str) -> String {
    let mut out = String::with_capacity(18 + event_type.len() + json.len());
    out.push_str("event: ");
    out.push_str(event_type);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut SseParser, chunk: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();
        parser.feed_into(chunk, &mut events);
        events
    }

    fn payloads(events: &[SseEvent]) -> Vec<&str> {
        events.iter().map(|event| event.data.as_str()).collect()
    }

    #[test]
    fn test_parse_simple_data_frame() {
        let mut parser = SseParser::new();
        let events = feed(&mut parser, "data: {\"a\":1}\n\n");
        assert_eq!(payloads(&events), vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_each_data_line_is_its_own_payload() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            "data: {\"n\":1}\ndata: {\"n\":2}\ndata: {\"n\":3}\n\ndata: [DONE]\n\n",
        );
        assert_eq!(
            payloads(&events),
            vec!["{\"n\":1}", "{\"n\":2}", "{\"n\":3}", "[DONE]"]
        );
    }

    #[test]
    fn test_parse_ignores_comments_and_other_fields() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            ": keep-alive\n\n\nevent: chunk\nid: 7\nretry: 10\ndata: x\n\n",
        );
        assert_eq!(payloads(&events), vec!["x"]);
    }

    #[test]
    fn test_parse_incremental_chunks() {
        let mut parser = SseParser::new();
        assert!(feed(&mut parser, "data: {\"cho").is_empty());
        let events = feed(&mut parser, "ices\":[]}\n");
        assert_eq!(payloads(&events), vec!["{\"choices\":[]}"]);
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = feed(&mut parser, "data: a\r\n\r\ndata:b\r\n\r\n");
        assert_eq!(payloads(&events), vec!["a", "b"]);
    }

    #[test]
    fn test_feed_bytes_split_inside_utf8_sequence() {
        let mut parser = SseParser::new();
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let mut events = Vec::new();
        parser.feed_bytes_into(&bytes[..split], &mut events);
        assert!(events.is_empty());
        parser.feed_bytes_into(&bytes[split..], &mut events);
        assert_eq!(payloads(&events), vec!["héllo"]);
    }

    #[test]
    fn test_feed_bytes_replaces_invalid_utf8() {
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        parser.feed_bytes_into(b"data: a\xffb\n\n", &mut events);
        assert_eq!(events[0].data, "a\u{FFFD}b");
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        parser.feed_into("data: [DONE]", &mut events);
        assert!(events.is_empty());
        parser.finish_into(&mut events);
        assert_eq!(payloads(&events), vec!["[DONE]"]);
    }

    #[test]
    fn test_anthropic_sse_frame_shape() {
        assert_eq!(
            anthropic_sse_frame("ping", "{\"type\":\"ping\"}"),
            "event: ping\ndata: {\"type\":\"ping\"}\n\n"
        );
    }
}
