use http::header::{HeaderName, AUTHORIZATION};
use rustc_hash::FxHashSet;

use crate::config::ClientAuthConfig;
use crate::error::BridgeError;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Compact key index used in hot-path authentication.
pub enum AllowedClientKeys {
    /// No keys configured: every request is accepted.
    Open,
    Single(Box<str>),
    Multiple(FxHashSet<String>),
}

/// Extract the client key: `x-api-key` first, then `Authorization: Bearer`.
#[must_use]
pub fn extract_api_key(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(X_API_KEY)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
        .map(str::trim)
}

/// Authenticate an incoming request against the pre-indexed key set.
///
/// # Errors
///
/// Returns `BridgeError::Auth` when keys are configured and the request's
/// key is missing or not among them.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), BridgeError> {
    if matches!(allowed_keys, AllowedClientKeys::Open) {
        return Ok(());
    }

    let client_key =
        extract_api_key(headers).ok_or_else(|| BridgeError::Auth("Missing API key".to_string()))?;
    let allowed = match allowed_keys {
        AllowedClientKeys::Open => true,
        AllowedClientKeys::Single(key) => client_key == key.as_ref(),
        AllowedClientKeys::Multiple(set) => set.contains(client_key),
    };

    if allowed {
        Ok(())
    } else {
        Err(BridgeError::Auth("Invalid API key".to_string()))
    }
}

/// Build the key index from configuration.
#[must_use]
pub fn build_allowed_key_set(config: &ClientAuthConfig) -> AllowedClientKeys {
    let mut allowed_set: FxHashSet<String> = config.allowed_keys.iter().cloned().collect();

    match allowed_set.len() {
        0 => AllowedClientKeys::Open,
        1 => match allowed_set.drain().next() {
            Some(single_key) => AllowedClientKeys::Single(single_key.into_boxed_str()),
            None => AllowedClientKeys::Open,
        },
        _ => AllowedClientKeys::Multiple(allowed_set),
    }
}
