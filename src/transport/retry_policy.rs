use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF_BASE_MS: u64 = 100;
const RETRY_BACKOFF_MAX_MS: u64 = 1_000;
const RETRY_AFTER_MAX_SECS: u64 = 30;
const RETRY_TRANSPORT_FAST_SECOND_MS: u64 = 10;

/// Transport error fragments worth another attempt.
const RETRIABLE_TRANSPORT_NEEDLES: [&str; 8] = [
    "timed out",
    "connection reset",
    "connection aborted",
    "connection refused",
    "broken pipe",
    "http2 error",
    "unexpected eof",
    "stream closed",
];

/// Fragments of errors on an already-established connection; those retry
/// immediately on a fresh connection.
const FAST_RETRY_TRANSPORT_NEEDLES: [&str; 5] = [
    "connection reset",
    "connection aborted",
    "broken pipe",
    "unexpected eof",
    "stream closed",
];

/// How long to wait before retrying after a retriable status, or `None` to
/// hand the response back as-is.
pub(crate) fn status_retry_delay(
    status: http::StatusCode,
    headers: &http::HeaderMap,
    attempt: u32,
) -> Option<Duration> {
    if attempt >= RETRY_MAX_ATTEMPTS || !matches!(status.as_u16(), 429 | 503 | 529) {
        return None;
    }
    Some(parse_retry_after_delay(headers).unwrap_or_else(|| backoff_delay(attempt)))
}

/// How long to wait before retrying after a transport error, or `None` when
/// the error is final.
pub(crate) fn transport_retry_delay(message: &str, attempt: u32) -> Option<Duration> {
    if attempt >= RETRY_MAX_ATTEMPTS || !contains_any(message, &RETRIABLE_TRANSPORT_NEEDLES) {
        return None;
    }
    if contains_any(message, &FAST_RETRY_TRANSPORT_NEEDLES) {
        return Some(if attempt == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(RETRY_TRANSPORT_FAST_SECOND_MS)
        });
    }
    Some(backoff_delay(attempt))
}

fn contains_any(message: &str, needles: &[&str]) -> bool {
    let lowered = message.to_ascii_lowercase();
    needles.iter().any(|needle| lowered.contains(needle))
}

fn backoff_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.min(10);
    Duration::from_millis(
        RETRY_BACKOFF_BASE_MS
            .saturating_mul(multiplier)
            .min(RETRY_BACKOFF_MAX_MS),
    )
}

fn parse_retry_after_delay(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds.min(RETRY_AFTER_MAX_SECS)));
    }

    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(Duration::from_secs(RETRY_AFTER_MAX_SECS)))
}
