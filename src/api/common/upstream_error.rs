use crate::error::BridgeError;
use crate::util::truncate_chars;

const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Reduce an upstream error body to a short message safe to show clients.
///
/// Prefers `error.message` (`OpenAI` and Anthropic shapes), then a bare
/// string `error` or top-level `message`, then the raw body as lossy UTF-8.
/// Truncated to 500 characters.
pub(crate) fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .and_then(serde_json::Value::as_str)
            .or_else(|| json.get("message").and_then(serde_json::Value::as_str));
        if let Some(message) = message {
            return truncate_chars(message.trim(), MAX_ERROR_MESSAGE_CHARS);
        }
    }

    let raw = String::from_utf8_lossy(body);
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "upstream returned an empty error body".to_string();
    }
    truncate_chars(trimmed, MAX_ERROR_MESSAGE_CHARS)
}

/// Drain a non-2xx upstream response into a `BridgeError::Upstream`.
pub(crate) async fn upstream_error_from_response(response: reqwest::Response) -> BridgeError {
    let status = response.status().as_u16();
    let message = match response.bytes().await {
        Ok(body) => sanitize_upstream_error(&body),
        Err(err) => format!("failed to read upstream error body: {err}"),
    };
    tracing::warn!(status, message = %message, "upstream returned an error");
    BridgeError::Upstream { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_error_message() {
        let body = br#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#;
        assert_eq!(sanitize_upstream_error(body), "model not found");
    }

    #[test]
    fn test_string_error_and_top_level_message() {
        assert_eq!(sanitize_upstream_error(br#"{"error":"nope"}"#), "nope");
        assert_eq!(sanitize_upstream_error(br#"{"message":"bad"}"#), "bad");
    }

    #[test]
    fn test_raw_body_is_truncated() {
        let body = "x".repeat(900);
        let message = sanitize_upstream_error(body.as_bytes());
        assert_eq!(message.chars().count(), 503);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn test_multibyte_message_truncates_on_char_boundary() {
        let body = serde_json::json!({"error": {"message": "é".repeat(600)}}).to_string();
        let message = sanitize_upstream_error(body.as_bytes());
        assert!(message.starts_with('é'));
        assert_eq!(message.chars().count(), 503);
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(
            sanitize_upstream_error(b"  "),
            "upstream returned an empty error body"
        );
    }
}
