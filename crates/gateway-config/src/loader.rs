//! Configuration loading from files and environment.
//!
//! Sources are parsed into a common value tree and deep-merged in order, so
//! a later source only overrides the keys it actually sets. `${VAR}` and
//! `${VAR:-default}` references in files are substituted before parsing.

use crate::schema::{GatewayConfig, TAVILY_API_KEY_ENV};
use secrecy::SecretString;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Prefix of the environment overrides read by [`load_config`]
pub const ENV_PREFIX: &str = "RESEARCH_GATEWAY";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path to the file that was not found
        path: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Unsupported format
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The file extension that was not supported
        extension: String,
    },

    /// Environment override could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidOverride {
        /// Environment variable name
        name: String,
        /// Offending value
        value: String,
    },

    /// Substitution pattern failed to compile
    #[error("Invalid substitution pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Configuration source
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path
    File(String),
    /// Raw YAML string
    Yaml(String),
    /// Raw TOML string
    Toml(String),
    /// Raw JSON string
    Json(String),
    /// Default configuration
    Default,
}

/// Configuration loader
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            env_prefix: None,
        }
    }

    /// Add a configuration source
    #[must_use]
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    #[must_use]
    pub fn with_file(self, path: impl Into<String>) -> Self {
        self.with_source(ConfigSource::File(path.into()))
    }

    /// Set environment variable prefix for overrides
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Load configuration from all sources
    ///
    /// # Errors
    /// Returns error if any source fails to load or validate
    pub async fn load(self) -> Result<GatewayConfig, ConfigError> {
        let mut merged = Value::Object(serde_json::Map::new());

        for source in &self.sources {
            let value = Self::load_source(source).await?;
            merge_values(&mut merged, value);
        }

        let mut config: GatewayConfig = serde_json::from_value(merged)?;

        if let Some(ref prefix) = self.env_prefix {
            Self::apply_env_overrides(&mut config, prefix)?;
        }

        if config.tavily.api_key.is_none() {
            config.tavily.api_key = config.tavily.resolve_api_key();
        }

        config
            .validate_config()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        info!(
            requests_per_minute = config.rate_limit.requests_per_minute,
            failure_threshold = config.circuit_breaker.failure_threshold,
            api_key_present = config.tavily.api_key.is_some(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Load a single source as a value tree
    async fn load_source(source: &ConfigSource) -> Result<Value, ConfigError> {
        match source {
            ConfigSource::File(path) => Self::load_file(path).await,
            ConfigSource::Yaml(content) => Self::parse_yaml(content),
            ConfigSource::Toml(content) => Self::parse_toml(content),
            ConfigSource::Json(content) => Self::parse_json(content),
            ConfigSource::Default => Ok(serde_json::to_value(GatewayConfig::default())?),
        }
    }

    /// Load configuration from a file
    async fn load_file(path: &str) -> Result<Value, ConfigError> {
        let path = Path::new(path);

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let content = Self::substitute_env_vars(&content)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!("Loading configuration from {} (format: {})", path.display(), extension);

        match extension.as_str() {
            "yaml" | "yml" => Self::parse_yaml(&content),
            "toml" => Self::parse_toml(&content),
            "json" => Self::parse_json(&content),
            ext => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    fn parse_yaml(content: &str) -> Result<Value, ConfigError> {
        // An empty document parses as null
        let value: Value = serde_yaml::from_str(content)?;
        Ok(if value.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            value
        })
    }

    fn parse_toml(content: &str) -> Result<Value, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn parse_json(content: &str) -> Result<Value, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Substitute environment variables in content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax
    fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}")?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_spec = &cap[1];

            let (var_name, default) = match var_spec.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_spec, None),
            };

            match (std::env::var(var_name), default) {
                (Ok(value), _) => result = result.replace(full_match, &value),
                (Err(_), Some(default)) => result = result.replace(full_match, default),
                // Left in place; optional keys may never be read
                (Err(_), None) => warn!("Environment variable not found: {}", var_name),
            }
        }

        Ok(result)
    }

    /// Apply `{prefix}_*` environment overrides
    fn apply_env_overrides(config: &mut GatewayConfig, prefix: &str) -> Result<(), ConfigError> {
        if let Some(value) = env_override(prefix, "RATE_LIMIT_PER_MINUTE") {
            config.rate_limit.requests_per_minute = parse_override(prefix, "RATE_LIMIT_PER_MINUTE", &value)?;
        }

        if let Some(value) = env_override(prefix, "CIRCUIT_BREAKER_THRESHOLD") {
            config.circuit_breaker.failure_threshold =
                parse_override(prefix, "CIRCUIT_BREAKER_THRESHOLD", &value)?;
        }

        if let Some(value) = env_override(prefix, "CIRCUIT_BREAKER_TIMEOUT") {
            config.circuit_breaker.timeout = parse_duration(prefix, "CIRCUIT_BREAKER_TIMEOUT", &value)?;
        }

        if let Some(value) = env_override(prefix, "TAVILY_BASE_URL") {
            config.tavily.base_url = value;
        }

        if let Some(value) = env_override(prefix, "TAVILY_TIMEOUT") {
            config.tavily.timeout = parse_duration(prefix, "TAVILY_TIMEOUT", &value)?;
        }

        if let Some(level) = env_override(prefix, "LOG_LEVEL") {
            config.observability.logging.level = level;
        }

        if let Some(value) = env_override(prefix, "METRICS_ENABLED") {
            config.observability.metrics.enabled = parse_override(prefix, "METRICS_ENABLED", &value)?;
        }

        if let Ok(key) = std::env::var(TAVILY_API_KEY_ENV) {
            if !key.trim().is_empty() {
                debug!("Using API key from {}", TAVILY_API_KEY_ENV);
                config.tavily.api_key = Some(SecretString::new(key));
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn env_override(prefix: &str, name: &str) -> Option<String> {
    std::env::var(format!("{prefix}_{name}")).ok()
}

fn parse_override<T: std::str::FromStr>(prefix: &str, name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        name: format!("{prefix}_{name}"),
        value: value.to_string(),
    })
}

/// Accepts humantime (`90s`, `2m`) or bare seconds
fn parse_duration(prefix: &str, name: &str, value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(trimmed).map_err(|_| ConfigError::InvalidOverride {
        name: format!("{prefix}_{name}"),
        value: value.to_string(),
    })
}

/// Deep-merge `overlay` into `base`; objects merge per key, anything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Load configuration from default locations
///
/// Looks for configuration in order:
/// 1. Path from CONFIG_PATH environment variable
/// 2. ./config.yaml
/// 3. ./config/default.yaml
///
/// `RESEARCH_GATEWAY_*` overrides and `TAVILY_API_KEY` are applied either way.
///
/// # Errors
/// Returns error if a configuration file fails to parse or validate
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let config_path = std::env::var("CONFIG_PATH").ok();

    let search_paths = if let Some(ref path) = config_path {
        vec![path.as_str()]
    } else {
        vec![
            "config.yaml",
            "config.yml",
            "config/default.yaml",
            "config/default.yml",
        ]
    };

    let loader = ConfigLoader::new().with_env_prefix(ENV_PREFIX);

    for path in &search_paths {
        if Path::new(path).exists() {
            info!("Loading configuration from: {}", path);
            return loader.with_file(*path).load().await;
        }
    }

    warn!("No configuration file found, using defaults");
    loader.with_source(ConfigSource::Default).load().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RG_LOADER_TEST_VAR", "test_value");

        let content = "key: ${RG_LOADER_TEST_VAR}";
        let result = ConfigLoader::substitute_env_vars(content).expect("substitute");
        assert_eq!(result, "key: test_value");

        std::env::remove_var("RG_LOADER_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        let content = "key: ${RG_LOADER_NONEXISTENT:-default_value}";
        let result = ConfigLoader::substitute_env_vars(content).expect("substitute");
        assert_eq!(result, "key: default_value");
    }

    #[test]
    fn test_merge_keeps_unset_keys() {
        let mut base = serde_json::json!({ "rate_limit": { "requests_per_minute": 10, "window": "30s" } });
        merge_values(
            &mut base,
            serde_json::json!({ "rate_limit": { "requests_per_minute": 20 } }),
        );
        assert_eq!(
            base,
            serde_json::json!({ "rate_limit": { "requests_per_minute": 20, "window": "30s" } })
        );
    }

    #[tokio::test]
    async fn test_load_yaml_content() {
        let yaml = r#"
rate_limit:
  requests_per_minute: 12
circuit_breaker:
  failure_threshold: 3
  timeout: 2m
tavily:
  api_key: tvly-from-yaml
"#;

        let config = ConfigLoader::new()
            .with_source(ConfigSource::Yaml(yaml.to_string()))
            .load()
            .await
            .expect("load config");

        assert_eq!(config.rate_limit.requests_per_minute, 12);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(120));
        assert_eq!(
            config.tavily.api_key.as_ref().map(|k| k.expose_secret().as_str()),
            Some("tvly-from-yaml")
        );
    }

    #[tokio::test]
    async fn test_later_sources_override() {
        let config = ConfigLoader::new()
            .with_source(ConfigSource::Toml(
                "[rate_limit]\nrequests_per_minute = 5\n\n[tavily]\nmax_polls = 10\n".to_string(),
            ))
            .with_source(ConfigSource::Json(
                r#"{"rate_limit": {"requests_per_minute": 7}}"#.to_string(),
            ))
            .load()
            .await
            .expect("load config");

        assert_eq!(config.rate_limit.requests_per_minute, 7);
        assert_eq!(config.tavily.max_polls, 10);
    }

    #[tokio::test]
    async fn test_load_default_config() {
        let config = ConfigLoader::new()
            .with_source(ConfigSource::Default)
            .load()
            .await
            .expect("load config");

        assert_eq!(config.rate_limit.requests_per_minute, 30);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let result = ConfigLoader::new()
            .with_source(ConfigSource::Yaml(
                "rate_limit:\n  requests_per_minute: 0\n".to_string(),
            ))
            .load()
            .await;

        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/research-gateway.yaml")
            .load()
            .await;

        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_env_overrides() {
        std::env::set_var("RG_OVERRIDE_TEST_RATE_LIMIT_PER_MINUTE", "45");
        std::env::set_var("RG_OVERRIDE_TEST_CIRCUIT_BREAKER_TIMEOUT", "90s");
        std::env::set_var("RG_OVERRIDE_TEST_METRICS_ENABLED", "false");

        let config = ConfigLoader::new()
            .with_source(ConfigSource::Default)
            .with_env_prefix("RG_OVERRIDE_TEST")
            .load()
            .await
            .expect("load config");

        assert_eq!(config.rate_limit.requests_per_minute, 45);
        assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(90));
        assert!(!config.observability.metrics.enabled);

        std::env::remove_var("RG_OVERRIDE_TEST_RATE_LIMIT_PER_MINUTE");
        std::env::remove_var("RG_OVERRIDE_TEST_CIRCUIT_BREAKER_TIMEOUT");
        std::env::remove_var("RG_OVERRIDE_TEST_METRICS_ENABLED");
    }

    #[tokio::test]
    async fn test_bad_override_is_an_error() {
        std::env::set_var("RG_BAD_TEST_CIRCUIT_BREAKER_THRESHOLD", "many");

        let result = ConfigLoader::new()
            .with_source(ConfigSource::Default)
            .with_env_prefix("RG_BAD_TEST")
            .load()
            .await;

        assert!(matches!(result, Err(ConfigError::InvalidOverride { .. })));

        std::env::remove_var("RG_BAD_TEST_CIRCUIT_BREAKER_THRESHOLD");
    }
}
