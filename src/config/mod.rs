pub mod validation;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Upstream request deadline, in seconds. Streaming calls apply it to the
    /// response headers and to each body read.
    pub timeout: u64,
    pub http_pool_max_idle_per_host: usize,
    pub http_pool_idle_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    pub base_path: String,
    pub http_use_env_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_reuse_port_listener_count: Option<usize>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_max_blocking_threads() -> Option<usize> {
    Some(8)
}

#[derive(Debug, Deserialize)]
struct ServerConfigWire {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    runtime_worker_threads: Option<RuntimeThreadsSetting>,
    #[serde(default)]
    runtime_max_blocking_threads: Option<RuntimeThreadsSetting>,
    #[serde(default)]
    base_path: String,
    #[serde(default)]
    http_use_env_proxy: bool,
    #[serde(default)]
    tcp_reuse_port_listener_count: Option<usize>,
}

/// A thread count, or `~` to let tokio decide.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuntimeThreadsSetting {
    Fixed(usize),
    Auto(()),
}

fn runtime_threads_or_default(
    setting: Option<&RuntimeThreadsSetting>,
    default: Option<usize>,
) -> Option<usize> {
    match setting {
        None => default,
        Some(RuntimeThreadsSetting::Fixed(threads)) => Some(*threads),
        Some(RuntimeThreadsSetting::Auto(())) => None,
    }
}

impl<'de> Deserialize<'de> for ServerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = ServerConfigWire::deserialize(deserializer)?;
        Ok(Self {
            port: wire.port,
            host: wire.host,
            timeout: wire.timeout,
            http_pool_max_idle_per_host: wire.http_pool_max_idle_per_host,
            http_pool_idle_timeout_secs: wire.http_pool_idle_timeout_secs,
            runtime_worker_threads: runtime_threads_or_default(
                wire.runtime_worker_threads.as_ref(),
                None,
            ),
            runtime_max_blocking_threads: runtime_threads_or_default(
                wire.runtime_max_blocking_threads.as_ref(),
                default_max_blocking_threads(),
            ),
            base_path: wire.base_path,
            http_use_env_proxy: wire.http_use_env_proxy,
            tcp_reuse_port_listener_count: wire.tcp_reuse_port_listener_count,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: default_max_blocking_threads(),
            base_path: String::new(),
            http_use_env_proxy: false,
            tcp_reuse_port_listener_count: None,
        }
    }
}

/// The OpenAI-compatible endpoint requests are forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Per-call timeout override, in seconds; `server.timeout` applies otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    /// Anthropic model name -> upstream model name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub model_map: HashMap<String, String>,
    #[serde(default)]
    pub hints: RouterHints,
}

fn default_true() -> bool {
    true
}
fn default_endpoint_path() -> String {
    "/chat/completions".to_string()
}

impl UpstreamConfig {
    /// Full URL of the chat-completions endpoint.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.endpoint_path.trim();
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Upstream model for a client-requested model.
    #[must_use]
    pub fn resolve_model<'a>(&'a self, requested: &'a str) -> &'a str {
        self.model_map
            .get(requested)
            .map_or(requested, String::as_str)
    }
}

/// Router-specific settings forwarded verbatim to the upstream.
///
/// The bridge never interprets these; they only matter to routers that
/// understand them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_bias: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_cache: Option<SemanticCacheConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_mode: Option<String>,
}

impl RouterHints {
    /// Render the configured hints as top-level request fields.
    #[must_use]
    pub fn to_extra_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.protocol.is_none()
            && self.cost_bias.is_none()
            && self.semantic_cache.is_none()
            && self.fallback_mode.is_none()
    }
}

/// Semantic cache parameters understood by some routers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

/// Client authentication configuration. No keys means an open proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    #[serde(default)]
    pub allowed_keys: Vec<String>,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
