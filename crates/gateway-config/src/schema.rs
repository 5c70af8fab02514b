//! Configuration schema definitions.
//!
//! This module defines all configuration types with validation and defaults.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Environment variable consulted when no API key is configured
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-caller admission limits
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Upstream failure isolation
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Tavily upstream
    #[validate(nested)]
    pub tavily: TavilyConfig,

    /// Logging and metrics
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns validation errors if configuration is invalid
    pub fn validate_config(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()
    }
}

/// Admission limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls admitted per caller within one window
    #[validate(range(min = 1, max = 100_000))]
    pub requests_per_minute: u32,

    /// Sliding window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[validate(range(min = 1, max = 100))]
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is let through
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Tavily upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TavilyConfig {
    /// API key; falls back to `TAVILY_API_KEY` when unset
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,

    /// API base URL
    #[validate(url)]
    pub base_url: String,

    /// Per-request HTTP timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Delay between research status polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Status polls before a research task is abandoned
    #[validate(range(min = 1, max = 10_000))]
    pub max_polls: u32,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.tavily.com".to_string(),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

impl TavilyConfig {
    /// Resolve the API key from config or the environment
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        use secrecy::ExposeSecret;

        if let Some(ref key) = self.api_key {
            if !key.expose_secret().trim().is_empty() {
                return Some(key.clone());
            }
        }

        std::env::var(TAVILY_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::new)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[validate(nested)]
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    #[validate(length(min = 1))]
    pub level: String,

    /// Log format
    pub format: LogFormat,

    /// Extra filter directives (e.g. "reqwest=warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            filter: None,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs
    #[default]
    Json,
    /// Human-readable pretty logs
    Pretty,
    /// Compact single-line logs
    Compact,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are collected
    pub enabled: bool,

    /// Histogram buckets for upstream latency
    #[serde(default = "default_latency_buckets")]
    #[validate(length(min = 1))]
    pub latency_buckets: Vec<f64>,
}

fn default_latency_buckets() -> Vec<f64> {
    vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_buckets: default_latency_buckets(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit.requests_per_minute, 30);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(60));
        assert!(config.tavily.api_key.is_none());
        assert!(config.observability.metrics.enabled);
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = GatewayConfig::default();
        config.tavily.base_url = "not a url".to_string();
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_configured_api_key_wins() {
        let tavily = TavilyConfig {
            api_key: Some(SecretString::new("tvly-configured".to_string())),
            ..TavilyConfig::default()
        };
        let key = tavily.resolve_api_key().expect("key");
        assert_eq!(key.expose_secret(), "tvly-configured");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = GatewayConfig::default();
        config.tavily.api_key = Some(SecretString::new("tvly-secret".to_string()));

        let yaml = serde_yaml::to_string(&config).expect("serialize");
        assert!(yaml.contains("rate_limit:"));
        assert!(yaml.contains("requests_per_minute: 30"));
        assert!(!yaml.contains("tvly-secret"));
    }

    #[test]
    fn test_humantime_durations() {
        let config: GatewayConfig = serde_yaml::from_str(
            "circuit_breaker:\n  timeout: 90s\ntavily:\n  poll_interval: 500ms\n",
        )
        .expect("deserialize");

        assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(90));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.tavily.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_log_format() {
        let format: LogFormat = serde_yaml::from_str("compact").expect("deserialize");
        assert_eq!(format, LogFormat::Compact);
    }
}
