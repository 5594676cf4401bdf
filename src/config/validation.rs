use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_allowed_keys(config)?;
    validate_upstream(config)?;
    validate_router_hints(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.runtime_worker_threads == Some(0) {
        return Err(validation_err(
            "server.runtime_worker_threads must be greater than 0 when set",
        ));
    }
    if server.runtime_max_blocking_threads == Some(0) {
        return Err(validation_err(
            "server.runtime_max_blocking_threads must be greater than 0 when set",
        ));
    }
    if server.tcp_reuse_port_listener_count == Some(0) {
        return Err(validation_err(
            "server.tcp_reuse_port_listener_count must be greater than 0 when set",
        ));
    }
    Ok(())
}

fn validate_allowed_keys(config: &AppConfig) -> Result<(), ConfigError> {
    for key in &config.client_authentication.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err("allowed_keys contains an empty key"));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(upstream.base_url.trim()).map_err(|err| {
        validation_err(format!("upstream.base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if upstream.api_key.trim().is_empty() {
        return Err(validation_err("upstream.api_key cannot be empty"));
    }
    if upstream.endpoint_path.trim().is_empty() {
        return Err(validation_err("upstream.endpoint_path cannot be empty"));
    }
    if upstream.call_timeout_secs == Some(0) {
        return Err(validation_err(
            "upstream.call_timeout_secs must be greater than 0 when set",
        ));
    }
    for (from, to) in &upstream.model_map {
        if from.trim().is_empty() || to.trim().is_empty() {
            return Err(validation_err(format!(
                "upstream.model_map entry '{from}' -> '{to}' must not be empty on either side"
            )));
        }
    }
    Ok(())
}

fn validate_router_hints(config: &AppConfig) -> Result<(), ConfigError> {
    let hints = &config.upstream.hints;
    if let Some(cost_bias) = hints.cost_bias {
        if !(0.0..=1.0).contains(&cost_bias) {
            return Err(validation_err(
                "upstream.hints.cost_bias must be between 0.0 and 1.0",
            ));
        }
    }
    if let Some(cache) = hints.semantic_cache.as_ref() {
        if let Some(threshold) = cache.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(validation_err(
                    "upstream.hints.semantic_cache.similarity_threshold must be between 0.0 and 1.0",
                ));
            }
        }
    }
    for (field, value) in [
        ("protocol", hints.protocol.as_deref()),
        ("fallback_mode", hints.fallback_mode.as_deref()),
    ] {
        if value.is_some_and(|value| value.trim().is_empty()) {
            return Err(validation_err(format!(
                "upstream.hints.{field} cannot be empty when set"
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            upstream: UpstreamConfig {
                enabled: true,
                base_url: "https://router.example.com/v1".to_string(),
                api_key: "sk-test".to_string(),
                endpoint_path: "/chat/completions".to_string(),
                call_timeout_secs: None,
                model_map: std::collections::HashMap::new(),
                hints: RouterHints::default(),
            },
            client_authentication: ClientAuthConfig {
                allowed_keys: vec!["sk-client-key".to_string()],
            },
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_empty_allowed_keys_is_open_proxy() {
        let mut config = make_valid_config();
        config.client_authentication.allowed_keys = vec![];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_blank_allowed_key() {
        let mut config = make_valid_config();
        config.client_authentication.allowed_keys = vec!["  ".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = make_valid_config();
        config.upstream.base_url = "ftp://bad.url".to_string();
        assert!(validate_config(&config).is_err());
        config.upstream.base_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_api_key() {
        let mut config = make_valid_config();
        config.upstream.api_key = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_endpoint_path() {
        let mut config = make_valid_config();
        config.upstream.endpoint_path = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_call_timeout() {
        let mut config = make_valid_config();
        config.upstream.call_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_model_map_target() {
        let mut config = make_valid_config();
        config
            .upstream
            .model_map
            .insert("claude-sonnet-4-5".to_string(), " ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_cost_bias_out_of_range() {
        let mut config = make_valid_config();
        config.upstream.hints.cost_bias = Some(1.5);
        let msg = validate_config(&config).unwrap_err().to_string();
        assert!(msg.contains("cost_bias"));
    }

    #[test]
    fn test_similarity_threshold_out_of_range() {
        let mut config = make_valid_config();
        config.upstream.hints.semantic_cache = Some(SemanticCacheConfig {
            enabled: true,
            similarity_threshold: Some(-0.1),
            ttl_secs: Some(60),
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_hint_strings() {
        let mut config = make_valid_config();
        config.upstream.hints.fallback_mode = Some(String::new());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = make_valid_config();
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = make_valid_config();
        config.features.log_level = "debug".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_server_counts() {
        let mut config = make_valid_config();
        config.server.http_pool_max_idle_per_host = 0;
        assert!(validate_config(&config).is_err());

        let mut config = make_valid_config();
        config.server.runtime_worker_threads = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = make_valid_config();
        config.server.tcp_reuse_port_listener_count = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = make_valid_config();
        config.server.timeout = 0;
        assert!(validate_config(&config).is_err());
    }
}
