//! # Gateway Resilience
//!
//! Admission and failure-isolation building blocks for the research gateway:
//! - Sliding-window rate limiting per caller
//! - Circuit breaker for a persistently failing upstream
//! - TTL result cache with bounded capacity
//! - Retry policy with exponential backoff
//! - Bridge running blocking upstream calls on a bounded worker pool
//! - Single-flight usage tracker

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod cache;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod usage;

// Re-export main types
pub use bridge::{BlockingBridge, BridgeConfig, BridgeTask};
pub use cache::{CacheConfig, CacheKey, CacheLookupResult, CacheStats, ResponseCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, WindowStats};
pub use retry::{RetryConfig, RetryPolicy, RetryResult};
pub use usage::UsageTracker;
