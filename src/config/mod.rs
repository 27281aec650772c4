pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

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

/// Inbound server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Whole-request timeout for upstream calls, in seconds.
    pub timeout: u64,
    pub http_pool_max_idle_per_host: usize,
    /// `0` keeps idle upstream connections forever.
    pub http_pool_idle_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            host: "0.0.0.0".to_string(),
            timeout: 180,
            http_pool_max_idle_per_host: 16,
            http_pool_idle_timeout_secs: 15,
            runtime_worker_threads: None,
            runtime_max_blocking_threads: Some(8),
            base_path: String::new(),
        }
    }
}

/// The Cohere endpoint and how requests are remapped for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub chat_path: String,
    /// Explicit proxy. Falls back to `HTTP_PROXY`, then `HTTPS_PROXY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    pub default_model: String,
    /// Removed from inbound model names before forwarding.
    pub model_prefix: String,
    pub connect_timeout_secs: u64,
    /// Extra attempts after a connect failure. Upstream statuses are never retried.
    pub connect_retries: u32,
    /// Cap on text held back for an incomplete upstream record.
    pub max_pending_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cohere.ai/v1".to_string(),
            chat_path: "/chat".to_string(),
            proxy: None,
            default_model: "command-r".to_string(),
            model_prefix: "net-".to_string(),
            connect_timeout_secs: 5,
            connect_retries: 2,
            max_pending_bytes: 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    /// Full chat endpoint URL.
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path)
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub log_level: String,
    /// Attach permissive CORS headers to relay responses.
    pub cors: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            cors: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Environment values that override the file. Names match case-insensitively and
/// an empty value counts as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub server_port: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub log_level: Option<String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    #[must_use]
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut overrides = Self::default();
        for (name, value) in vars {
            let value: String = value.into();
            if value.trim().is_empty() {
                continue;
            }
            let slot = match name.as_ref().to_ascii_uppercase().as_str() {
                "SERVER_PORT" => &mut overrides.server_port,
                "HTTP_PROXY" => &mut overrides.http_proxy,
                "HTTPS_PROXY" => &mut overrides.https_proxy,
                "LOG_LEVEL" => &mut overrides.log_level,
                _ => continue,
            };
            // First match wins when both cases are set.
            if slot.is_none() {
                *slot = Some(value.trim().to_string());
            }
        }
        overrides
    }

    /// Apply onto `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `SERVER_PORT` is not a port number.
    pub fn apply(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(port) = &self.server_port {
            config.server.port = port.parse().map_err(|_| {
                ConfigError::Validation(format!("SERVER_PORT is not a valid port: {port}"))
            })?;
        }
        if config.upstream.proxy.is_none() {
            config.upstream.proxy = self.http_proxy.clone().or_else(|| self.https_proxy.clone());
        }
        if let Some(level) = &self.log_level {
            config.features.log_level.clone_from(level);
        }
        Ok(())
    }
}

/// Config file path from `RELAY_CONFIG`, or `config.yaml`.
#[must_use]
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

fn read_config(path: &str) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_yaml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(err) => Err(err.into()),
    }
}

/// Load configuration from a YAML file and validate it.
///
/// A missing file yields the built-in defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Like [`load_config`], with environment overrides applied before validation.
///
/// # Errors
///
/// See [`load_config`] and [`EnvOverrides::apply`].
pub fn load_config_with_env(path: &str, env: &EnvOverrides) -> Result<AppConfig, ConfigError> {
    let mut config = read_config(path)?;
    env.apply(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}
