use crate::protocol::error_shapes::anthropic_error_payload;

/// Error type shared by every layer of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol translation error: {0}")]
    Translation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code and error-type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    ServerError,
    /// Upstream connectivity or non-2xx answers, always surfaced as `api_error`.
    Upstream(u16),
}

/// Map an upstream HTTP status code to the status returned to the client.
#[must_use]
pub fn client_status_for_upstream(status: u16) -> http::StatusCode {
    match status {
        400..=499 => {
            http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::BAD_REQUEST)
        }
        529 => http::StatusCode::SERVICE_UNAVAILABLE,
        _ => http::StatusCode::BAD_GATEWAY,
    }
}

impl BridgeError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            BridgeError::Auth(_) => ErrorCategory::Authentication,
            BridgeError::Config(_) | BridgeError::Translation(_) | BridgeError::Internal(_) => {
                ErrorCategory::ServerError
            }
            BridgeError::Transport(_) => ErrorCategory::Upstream(502),
            BridgeError::Upstream { status, .. } => ErrorCategory::Upstream(*status),
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCategory::Upstream(status) => client_status_for_upstream(status),
    }
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Format an error as an Anthropic error envelope, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &BridgeError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let message = match err {
        BridgeError::Upstream { message, .. } => message.clone(),
        other => other.to_string(),
    };
    (status, anthropic_error_payload(cat, &message))
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `BridgeError` into an axum response carrying the error envelope.
#[must_use]
pub fn into_axum_response(err: &BridgeError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_api_error() {
        let err = BridgeError::Transport("connection refused".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "api_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_upstream_error_keeps_client_status_and_api_error_type() {
        let err = BridgeError::Upstream {
            status: 429,
            message: "slow down".to_string(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["type"], "api_error");
        assert_eq!(body["error"]["message"], "slow down");
    }

    #[test]
    fn test_upstream_server_error_maps_to_bad_gateway() {
        let err = BridgeError::Upstream {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(format_error(&err).0, http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_request_error_type() {
        let err = BridgeError::InvalidRequest("bad json".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[test]
    fn test_auth_error_type() {
        let (status, body) = format_error(&BridgeError::Auth("Missing API key".to_string()));
        assert_eq!(status, http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
    }
}
