use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::BridgeError;

/// The chat-completions endpoint, resolved once at startup.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    url: url::Url,
    headers: http::HeaderMap,
    call_timeout: Option<Duration>,
}

impl UpstreamEndpoint {
    /// Parse the endpoint URL and build the static request headers.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the URL does not parse or the API
    /// key is not a valid header value.
    pub fn from_config(upstream: &UpstreamConfig) -> Result<Self, BridgeError> {
        let url = url::Url::parse(&upstream.endpoint_url())
            .map_err(|err| BridgeError::Config(format!("Invalid upstream URL: {err}")))?;

        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        let mut authorization =
            http::HeaderValue::from_str(&format!("Bearer {}", upstream.api_key.trim())).map_err(
                |_| BridgeError::Config("upstream.api_key is not a valid header value".to_string()),
            )?;
        authorization.set_sensitive(true);
        headers.insert(http::header::AUTHORIZATION, authorization);

        Ok(Self {
            url,
            headers,
            call_timeout: upstream.call_timeout_secs.map(Duration::from_secs),
        })
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }

    /// Per-call timeout override, if configured.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}
