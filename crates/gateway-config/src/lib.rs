//! # Gateway Configuration
//!
//! Configuration management for the research gateway, including:
//! - Configuration schema and validation
//! - Loading from YAML/TOML/JSON files with deep merging
//! - Environment variable substitution and overrides

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod schema;

// Re-export main types
pub use loader::{load_config, ConfigError, ConfigLoader, ConfigSource, ENV_PREFIX};
pub use schema::{
    CircuitBreakerConfig, GatewayConfig, LogFormat, LoggingConfig, MetricsConfig,
    ObservabilityConfig, RateLimitConfig, TavilyConfig, TAVILY_API_KEY_ENV,
};
