//! Gateway construction.

use gateway_config::GatewayConfig;
use gateway_core::{GatewayError, GatewayResult, ResearchProvider, UsageSource};
use gateway_providers::{TavilyConfig, TavilyProvider, TavilyUsageClient};
use gateway_resilience::{
    BlockingBridge, BridgeConfig, CacheConfig, CircuitBreaker, CircuitBreakerConfig, RateLimiter,
    RateLimiterConfig, ResponseCache, RetryConfig, RetryPolicy, UsageTracker,
};
use gateway_telemetry::{
    init_logging, LogFormat, LoggingConfig, LoggingError, Metrics, MetricsConfig,
};
use std::sync::Arc;
use tracing::info;

use crate::gateway::ResearchGateway;

/// Name of the breaker guarding the upstream
const UPSTREAM: &str = "tavily";

/// Builder for [`ResearchGateway`]
///
/// Cache, retry and bridge settings default to fixed production values;
/// overriding them is meant for tests.
pub struct GatewayBuilder {
    provider: Option<Arc<dyn ResearchProvider>>,
    usage_source: Option<Arc<dyn UsageSource>>,
    rate_limit: RateLimiterConfig,
    circuit_breaker: CircuitBreakerConfig,
    cache: CacheConfig,
    retry: RetryConfig,
    bridge: BridgeConfig,
    metrics: Option<Arc<Metrics>>,
}

impl GatewayBuilder {
    /// Create a builder with default settings and no upstream
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: None,
            usage_source: None,
            rate_limit: RateLimiterConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            bridge: BridgeConfig::default(),
            metrics: None,
        }
    }

    /// Builder wired to Tavily as described by `config`
    ///
    /// Builds a blocking HTTP client, so call it outside of async code (for
    /// example through `tokio::task::spawn_blocking`).
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if no API key is configured or
    /// metrics cannot be registered
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let api_key = config.tavily.resolve_api_key().ok_or_else(|| {
            GatewayError::configuration(
                "Tavily API key is not configured; set tavily.api_key or TAVILY_API_KEY",
            )
        })?;

        let provider = TavilyProvider::new(
            TavilyConfig::with_secret(UPSTREAM, api_key.clone())
                .with_base_url(config.tavily.base_url.as_str())
                .with_timeout(config.tavily.timeout)
                .with_polling(config.tavily.poll_interval, config.tavily.max_polls),
        )?;
        let usage = TavilyUsageClient::new(api_key)?.with_base_url(config.tavily.base_url.as_str());

        let mut builder = Self::new()
            .provider(Arc::new(provider))
            .usage_source(Arc::new(usage))
            .rate_limit(RateLimiterConfig {
                max_requests: config.rate_limit.requests_per_minute,
                window: config.rate_limit.window,
            })
            .circuit_breaker(CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker.failure_threshold,
                recovery_timeout: config.circuit_breaker.timeout,
            });

        if config.observability.metrics.enabled {
            let metrics = Metrics::new(&MetricsConfig {
                enabled: true,
                latency_buckets: config.observability.metrics.latency_buckets.clone(),
                ..MetricsConfig::default()
            })
            .map_err(|e| GatewayError::configuration(format!("Failed to register metrics: {e}")))?;
            builder = builder.metrics(Arc::new(metrics));
        }

        Ok(builder)
    }

    /// Set the upstream provider
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ResearchProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the usage endpoint
    #[must_use]
    pub fn usage_source(mut self, source: Arc<dyn UsageSource>) -> Self {
        self.usage_source = Some(source);
        self
    }

    /// Set the per-caller rate limit
    #[must_use]
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Set the circuit breaker configuration
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Set the cache configuration
    #[must_use]
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Set the retry configuration
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Set the blocking bridge configuration
    #[must_use]
    pub fn bridge(mut self, config: BridgeConfig) -> Self {
        self.bridge = config;
        self
    }

    /// Record Prometheus metrics
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the gateway
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if the provider or usage source
    /// is missing
    pub fn build(self) -> GatewayResult<ResearchGateway> {
        let provider = self
            .provider
            .ok_or_else(|| GatewayError::configuration("a research provider is required"))?;
        let usage_source = self
            .usage_source
            .ok_or_else(|| GatewayError::configuration("a usage source is required"))?;

        info!(
            provider = %provider.id(),
            requests_per_window = self.rate_limit.max_requests,
            failure_threshold = self.circuit_breaker.failure_threshold,
            workers = self.bridge.workers,
            metrics = self.metrics.is_some(),
            "Research gateway initialized"
        );

        Ok(ResearchGateway {
            provider,
            limiter: RateLimiter::new("research", self.rate_limit),
            breaker: Arc::new(CircuitBreaker::new(UPSTREAM, self.circuit_breaker)),
            cache: ResponseCache::new(self.cache),
            retry: RetryPolicy::new(self.retry),
            bridge: BlockingBridge::new(self.bridge),
            usage: Arc::new(UsageTracker::new(usage_source)),
            metrics: self.metrics,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResearchGateway {
    /// Build a Tavily-backed gateway from configuration
    ///
    /// # Errors
    /// See [`GatewayBuilder::from_config`]
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        GatewayBuilder::from_config(config)?.build()
    }
}

/// Install the global `tracing` subscriber described by `config`
///
/// # Errors
/// Returns error if a subscriber is already installed or the filter is invalid
pub fn init_tracing(config: &GatewayConfig) -> Result<(), LoggingError> {
    init_logging(&logging_config(config))
}

fn logging_config(config: &GatewayConfig) -> LoggingConfig {
    let logging = &config.observability.logging;
    let format = match logging.format {
        gateway_config::LogFormat::Json => LogFormat::Json,
        gateway_config::LogFormat::Pretty => LogFormat::Pretty,
        gateway_config::LogFormat::Compact => LogFormat::Compact,
    };

    let mut telemetry = LoggingConfig::new()
        .with_level(logging.level.as_str())
        .with_format(format);
    if let Some(ref filter) = logging.filter {
        telemetry = telemetry.with_filter(filter.as_str());
    }
    telemetry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_provider() {
        let err = GatewayBuilder::new().build().unwrap_err();
        assert!(matches!(err, GatewayError::Configuration { .. }));
    }

    #[test]
    fn test_logging_config_mapping() {
        let mut config = GatewayConfig::default();
        config.observability.logging.level = "debug".to_string();
        config.observability.logging.format = gateway_config::LogFormat::Compact;
        config.observability.logging.filter = Some("reqwest=warn".to_string());

        let telemetry = logging_config(&config);
        assert_eq!(telemetry.level, "debug");
        assert_eq!(telemetry.format, LogFormat::Compact);
        assert_eq!(telemetry.filter.as_deref(), Some("reqwest=warn"));
    }
}
