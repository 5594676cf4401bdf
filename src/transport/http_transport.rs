use std::sync::{Once, OnceLock};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::BridgeError;

use super::retry_policy::{status_retry_delay, transport_retry_delay};
use super::upstream::UpstreamEndpoint;

static RUSTLS_PROVIDER_INIT: Once = Once::new();
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// No overall client timeout: it would also cap how long a streamed body may
/// run. Request deadlines are applied per call instead, and `read_timeout`
/// bounds a stalled body.
fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    read_timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, BridgeError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .read_timeout(read_timeout);

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| BridgeError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// `reqwest` hides the interesting part (refused, reset, timed out) in the
/// source chain.
fn error_chain_message(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

/// Pooled HTTP client for upstream calls, with retries on transient failures.
pub struct HttpTransport {
    client: OnceLock<reqwest::Client>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    use_env_proxy: bool,
}

impl HttpTransport {
    /// Create a transport with connection pooling and timeouts from the server config.
    ///
    /// The underlying client is built on first use.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        RUSTLS_PROVIDER_INIT.call_once(|| {
            let _ = rustls::crypto::ring::default_provider().install_default();
        });

        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        Self {
            client: OnceLock::new(),
            pool_max_idle_per_host: config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
            use_env_proxy: config.http_use_env_proxy,
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(|| {
            build_reqwest_client(
                self.pool_max_idle_per_host,
                self.pool_idle_timeout,
                self.timeout,
                self.use_env_proxy,
            )
            .unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to build configured HTTP client, falling back to default client");
                reqwest::Client::new()
            })
        })
    }

    /// POST a JSON body to the upstream endpoint.
    ///
    /// Retriable statuses (429, 503, 529) and transient transport errors are
    /// retried with backoff. Any other response is returned as-is, whatever
    /// its status; the body is left unread so streaming callers can consume
    /// it incrementally.
    ///
    /// The request deadline (the endpoint's per-call timeout, else the server
    /// timeout) covers the whole exchange for buffered calls. For `streaming`
    /// calls it only covers waiting for the response headers.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the request cannot be sent and
    /// retries are exhausted.
    pub async fn post_json(
        &self,
        endpoint: &UpstreamEndpoint,
        body: bytes::Bytes,
        streaming: bool,
    ) -> Result<reqwest::Response, BridgeError> {
        let client = self.client();
        let deadline = endpoint.call_timeout().unwrap_or(self.timeout);
        let mut attempt = 0;
        loop {
            let mut request = reqwest::Request::new(http::Method::POST, endpoint.url().clone());
            *request.headers_mut() = endpoint.headers().clone();
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));
            let sent = if streaming {
                match tokio::time::timeout(deadline, client.execute(request)).await {
                    Ok(result) => result.map_err(|err| error_chain_message(&err)),
                    Err(_) => Err(format!(
                        "upstream response headers timed out after {}s",
                        deadline.as_secs()
                    )),
                }
            } else {
                *request.timeout_mut() = Some(deadline);
                client.execute(request).await.map_err(|err| error_chain_message(&err))
            };

            match sent {
                Ok(response) => {
                    let Some(delay) =
                        status_retry_delay(response.status(), response.headers(), attempt)
                    else {
                        return Ok(response);
                    };
                    tracing::debug!(
                        status = response.status().as_u16(),
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "retrying upstream request after retriable status"
                    );
                    drop(response);
                    tokio::time::sleep(delay).await;
                }
                Err(message) => {
                    let Some(delay) = transport_retry_delay(&message, attempt) else {
                        return Err(BridgeError::Transport(message));
                    };
                    tracing::debug!(
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %message,
                        "retrying upstream request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }
}
