use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: [&str; 6] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(&upstream.base_url).map_err(|err| {
        validation_err(format!("upstream.base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if !upstream.chat_path.starts_with('/') {
        return Err(validation_err("upstream.chat_path must start with '/'"));
    }
    if upstream.default_model.trim().is_empty() {
        return Err(validation_err("upstream.default_model cannot be empty"));
    }
    if upstream.max_pending_bytes == 0 {
        return Err(validation_err(
            "upstream.max_pending_bytes must be greater than 0",
        ));
    }
    validate_proxy_url(upstream.proxy.as_deref())
}

fn validate_proxy_url(proxy: Option<&str>) -> Result<(), ConfigError> {
    let Some(proxy) = proxy.map(str::trim) else {
        return Ok(());
    };
    if proxy.is_empty() {
        return Err(validation_err("upstream.proxy cannot be empty when set"));
    }
    let parsed = url::Url::parse(proxy)
        .map_err(|err| validation_err(format!("upstream.proxy is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.proxy must use http:// or https://",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    if !VALID_LOG_LEVELS.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {VALID_LOG_LEVELS:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(config: &AppConfig) {
        assert!(matches!(
            validate_config(config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_invalid_pool_max_idle_per_host() {
        let mut config = AppConfig::default();
        config.server.http_pool_max_idle_per_host = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_invalid_runtime_worker_threads() {
        let mut config = AppConfig::default();
        config.server.runtime_worker_threads = Some(0);
        assert_invalid(&config);
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "ftp://api.cohere.ai".to_string();
        assert_invalid(&config);
        config.upstream.base_url = "not a url".to_string();
        assert_invalid(&config);
    }

    #[test]
    fn test_chat_path_needs_leading_slash() {
        let mut config = AppConfig::default();
        config.upstream.chat_path = "chat".to_string();
        assert_invalid(&config);
    }

    #[test]
    fn test_empty_default_model() {
        let mut config = AppConfig::default();
        config.upstream.default_model = "  ".to_string();
        assert_invalid(&config);
    }

    #[test]
    fn test_zero_max_pending_bytes() {
        let mut config = AppConfig::default();
        config.upstream.max_pending_bytes = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_invalid_proxy_url() {
        let mut config = AppConfig::default();
        config.upstream.proxy = Some("::not-a-url".to_string());
        assert_invalid(&config);
        config.upstream.proxy = Some("ftp://proxy:21".to_string());
        assert_invalid(&config);
    }

    #[test]
    fn test_valid_proxy_url() {
        let mut config = AppConfig::default();
        config.upstream.proxy = Some("http://127.0.0.1:7890".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_log_level_is_case_insensitive() {
        let mut config = AppConfig::default();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
        config.features.log_level = "verbose".to_string();
        assert_invalid(&config);
    }
}
