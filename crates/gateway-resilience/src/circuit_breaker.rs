//! Circuit breaker isolating the gateway from a failing upstream.
//!
//! Closed -> Open after `failure_threshold` consecutive failures. Open ->
//! HalfOpen once `recovery_timeout` has passed since the last failure; the
//! call that observes the elapsed timeout performs the transition and is let
//! through as the probe. HalfOpen -> Closed on success, back to Open on
//! failure.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Operating normally
    Closed,
    /// Rejecting calls until the recovery timeout elapses
    Open,
    /// Letting a probe through to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable name used in logs and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding for gauges
    #[must_use]
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time to stay open after the last failure
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    times_opened: u64,
}

/// Point-in-time breaker statistics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Failures recorded since creation
    pub total_failures: u64,
    /// Successes recorded since creation
    pub total_successes: u64,
    /// Number of Closed/HalfOpen -> Open transitions
    pub times_opened: u64,
    /// Time since the last failure
    #[serde(skip)]
    pub since_last_failure: Option<Duration>,
}

/// Three-state circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                total_failures: 0,
                total_successes: 0,
                times_opened: 0,
            }),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Name of the guarded upstream
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without attempting any transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call may proceed
    ///
    /// In the Open state this performs the Open -> HalfOpen transition once
    /// the recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(Duration::MAX, |at| Instant::now().duration_since(at));
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!(
                        breaker = %self.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Circuit breaker half-open, probing upstream"
                    );
                    true
                } else {
                    debug!(breaker = %self.name, "Circuit breaker open, rejecting call");
                    false
                }
            }
        }
    }

    /// Record a successful upstream call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        if inner.state != CircuitState::Closed {
            info!(
                breaker = %self.name,
                from = %inner.state,
                "Circuit breaker closed"
            );
            inner.state = CircuitState::Closed;
        }
    }

    /// Record a failed upstream call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let should_open = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_open {
            inner.state = CircuitState::Open;
            inner.times_opened += 1;
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                "Circuit breaker opened"
            );
        } else {
            debug!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "Circuit breaker recorded failure"
            );
        }
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            times_opened: inner.times_opened,
            since_last_failure: inner
                .last_failure
                .map(|at| Instant::now().duration_since(at)),
        }
    }

    /// Force the breaker closed and clear the failure count
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        info!(breaker = %self.name, "Circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn breaker(threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_then_half_opens_after_timeout() {
        let cb = breaker(2, 5);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());

        advance(Duration::from_secs(6)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_open_before_timeout() {
        let cb = breaker(1, 60);

        cb.record_failure();
        advance(Duration::from_secs(59)).await;
        assert!(!cb.can_execute());
        assert_eq!(cb.state(), CircuitState::Open);

        advance(Duration::from_secs(1)).await;
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = breaker(2, 5);
        cb.record_failure();
        cb.record_failure();
        advance(Duration::from_secs(5)).await;
        assert!(cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 0);

        // Needs the full threshold again to reopen
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(3, 10);
        for _ in 0..3 {
            cb.record_failure();
        }
        advance(Duration::from_secs(10)).await;
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());

        // Timeout restarts from the probe failure
        advance(Duration::from_secs(9)).await;
        assert!(!cb.can_execute());
        advance(Duration::from_secs(1)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.stats().times_opened, 2);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, 60);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        let stats = cb.stats();
        assert_eq!(stats.consecutive_failures, 2);
        assert_eq!(stats.total_failures, 4);
        assert_eq!(stats.total_successes, 1);
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1, 60);
        cb.record_failure();
        assert!(!cb.can_execute());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(CircuitState::Open.as_gauge(), 1);
    }
}
