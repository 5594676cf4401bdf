mod request_id;

use crate::auth::{authenticate, build_allowed_key_set, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::transport::{HttpTransport, UpstreamEndpoint};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Immutable after construction apart from the id counter.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub endpoint: UpstreamEndpoint,
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        endpoint: UpstreamEndpoint,
        allowed_client_keys: AllowedClientKeys,
    ) -> Self {
        Self {
            config,
            transport,
            endpoint,
            allowed_client_keys,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build the transport, endpoint and key index from a validated config.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` when the upstream endpoint cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, BridgeError> {
        let transport = HttpTransport::new(&config.server);
        let endpoint = UpstreamEndpoint::from_config(&config.upstream)?;
        let allowed_client_keys = build_allowed_key_set(&config.client_authentication);
        Ok(Self::new(config, transport, endpoint, allowed_client_keys))
    }

    /// Authenticate a request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Auth` when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), BridgeError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    pub fn next_message_id(&self) -> String {
        self.request_ids.next_message_id()
    }
}
