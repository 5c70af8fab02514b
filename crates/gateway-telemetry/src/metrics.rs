//! Prometheus metrics for the gateway.
//!
//! Provides metrics for:
//! - Call counts by operation and outcome
//! - Upstream latency
//! - Cache, rate limiter and circuit breaker activity
//! - Retry attempts

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

const NAMESPACE: &str = "research_gateway";

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,
    /// Histogram buckets for upstream latency (seconds)
    pub latency_buckets: Vec<f64>,
    /// Constant labels added to all metrics
    pub labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // Research tasks poll for minutes; searches finish in seconds
            latency_buckets: vec![
                0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ],
            labels: HashMap::new(),
        }
    }
}

/// How a gateway call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Upstream call succeeded
    Success,
    /// Served from cache
    Cached,
    /// Rejected by validation
    Invalid,
    /// Rejected by the rate limiter
    RateLimited,
    /// Rejected by the open circuit breaker
    CircuitOpen,
    /// Upstream call failed
    UpstreamError,
    /// Gateway-side failure
    InternalError,
}

impl CallOutcome {
    /// Metric label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cached => "cached",
            Self::Invalid => "invalid",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::UpstreamError => "upstream_error",
            Self::InternalError => "internal_error",
        }
    }
}

/// Main metrics registry and collectors
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    upstream_latency: HistogramVec,
    active_requests: IntGaugeVec,
    cache_lookups: IntCounterVec,
    rate_limit_hits: IntCounterVec,
    circuit_breaker_state: IntGaugeVec,
    retry_attempts: IntCounterVec,
    stream_chunks: CounterVec,
}

impl Metrics {
    /// Create a new metrics instance
    ///
    /// # Errors
    /// Returns error if metrics cannot be registered
    pub fn new(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(None, Some(config.labels.clone()))?;

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Gateway calls by operation and outcome")
                .namespace(NAMESPACE),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new(
                "upstream_duration_seconds",
                "Upstream call latency in seconds, retries included",
            )
            .namespace(NAMESPACE)
            .buckets(config.latency_buckets.clone()),
            &["operation"],
        )?;
        registry.register(Box::new(upstream_latency.clone()))?;

        let active_requests = IntGaugeVec::new(
            Opts::new("active_requests", "Calls currently dispatched upstream")
                .namespace(NAMESPACE),
            &["operation"],
        )?;
        registry.register(Box::new(active_requests.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Result cache lookups").namespace(NAMESPACE),
            &["operation", "result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let rate_limit_hits = IntCounterVec::new(
            Opts::new("rate_limit_hits_total", "Calls rejected by the rate limiter")
                .namespace(NAMESPACE),
            &["operation"],
        )?;
        registry.register(Box::new(rate_limit_hits.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "Circuit breaker state (0=closed, 1=open, 2=half-open)",
            )
            .namespace(NAMESPACE),
            &["upstream"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let retry_attempts = IntCounterVec::new(
            Opts::new(
                "retry_attempts_total",
                "Upstream attempts beyond the first",
            )
            .namespace(NAMESPACE),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let stream_chunks = CounterVec::new(
            Opts::new("stream_chunks_total", "Research chunks streamed to callers")
                .namespace(NAMESPACE),
            &["operation"],
        )?;
        registry.register(Box::new(stream_chunks.clone()))?;

        info!("Metrics initialized");

        Ok(Self {
            registry,
            requests_total,
            upstream_latency,
            active_requests,
            cache_lookups,
            rate_limit_hits,
            circuit_breaker_state,
            retry_attempts,
            stream_chunks,
        })
    }

    /// Record how a call ended
    pub fn record_call(&self, operation: &str, outcome: CallOutcome) {
        self.requests_total
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
    }

    /// Record a finished upstream dispatch
    pub fn record_upstream(&self, operation: &str, latency: Duration, attempts: u32) {
        self.upstream_latency
            .with_label_values(&[operation])
            .observe(latency.as_secs_f64());

        if attempts > 1 {
            self.retry_attempts
                .with_label_values(&[operation])
                .inc_by(u64::from(attempts - 1));
        }

        debug!(
            operation,
            latency_ms = latency.as_millis() as u64,
            attempts,
            "Upstream metrics recorded"
        );
    }

    /// Count a dispatched call as active until the returned guard drops
    ///
    /// The guard also releases the slot when the caller's future is
    /// cancelled mid-call.
    pub fn track_active(&self, operation: &str) -> ActiveCall {
        let gauge = self.active_requests.with_label_values(&[operation]);
        gauge.inc();
        ActiveCall { gauge }
    }

    /// Record a cache lookup result (`hit`, `miss`, ...)
    pub fn record_cache_lookup(&self, operation: &str, result: &str) {
        self.cache_lookups
            .with_label_values(&[operation, result])
            .inc();
    }

    /// Record a rate limit rejection
    pub fn record_rate_limit_hit(&self, operation: &str) {
        self.rate_limit_hits.with_label_values(&[operation]).inc();
    }

    /// Update the circuit breaker state gauge
    pub fn update_circuit_breaker(&self, upstream: &str, state: i64) {
        self.circuit_breaker_state
            .with_label_values(&[upstream])
            .set(state);
    }

    /// Record a streamed chunk
    pub fn record_stream_chunk(&self, operation: &str) {
        self.stream_chunks.with_label_values(&[operation]).inc();
    }

    /// Get metrics as Prometheus text format
    #[must_use]
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Get the Prometheus registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Slot in the active-requests gauge, released on drop
#[must_use = "the call stops counting as active as soon as the guard drops"]
#[derive(Debug)]
pub struct ActiveCall {
    gauge: IntGauge,
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
