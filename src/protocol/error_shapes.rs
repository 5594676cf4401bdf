use crate::error::ErrorCategory;

fn anthropic_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::ServerError | ErrorCategory::Upstream(_) => "api_error",
    }
}

#[must_use]
pub(crate) fn anthropic_error_payload(cat: ErrorCategory, message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "error": {
            "type": anthropic_error_type(cat),
            "message": message,
        }
    })
}

/// Build the `error` stream event body used when an upstream stream breaks mid-flight.
#[must_use]
pub(crate) fn anthropic_stream_error_json(message: &str) -> String {
    anthropic_error_payload(ErrorCategory::Upstream(502), message).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_error_payload_shape() {
        let payload = anthropic_error_payload(ErrorCategory::InvalidRequest, "bad");
        assert_eq!(payload["type"], "error");
        assert_eq!(payload["error"]["type"], "invalid_request_error");
        assert_eq!(payload["error"]["message"], "bad");
    }

    #[test]
    fn test_stream_error_json_is_api_error() {
        let json: serde_json::Value =
            serde_json::from_str(&anthropic_stream_error_json("reset")).unwrap();
        assert_eq!(json["error"]["type"], "api_error");
        assert_eq!(json["error"]["message"], "reset");
    }
}
