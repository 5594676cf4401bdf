use std::sync::atomic::{AtomicU64, Ordering};

static TOOL_USE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static SERVER_TOOL_USE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
const HEX: &[u8; 16] = b"0123456789abcdef";

/// Placeholder id for a streamed tool call whose real id has not arrived yet.
#[inline]
pub(crate) fn next_tool_use_id() -> String {
    next_prefixed_id("toolu_", &TOOL_USE_ID_COUNTER)
}

/// Id for a synthesized `server_tool_use` block.
#[inline]
pub(crate) fn next_server_tool_use_id() -> String {
    next_prefixed_id("srvtoolu_", &SERVER_TOOL_USE_ID_COUNTER)
}

fn next_prefixed_id(prefix: &str, counter: &AtomicU64) -> String {
    let id = counter.fetch_add(1, Ordering::Relaxed);
    format_request_seq_hex(prefix, id)
}

#[inline]
pub(crate) fn format_request_seq_hex(prefix: &str, request_seq: u64) -> String {
    let mut out = String::with_capacity(prefix.len() + 16);
    out.push_str(prefix);
    push_u64_hex_16(&mut out, request_seq);
    out
}

#[inline]
fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + 3);
            out.push_str(&text[..cut]);
            out.push_str("...");
            out
        }
        None => text.to_string(),
    }
}
