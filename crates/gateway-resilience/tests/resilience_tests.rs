//! Integration tests combining the resilience primitives the way the gateway
//! does: admission, retried bridge dispatch, breaker bookkeeping.

use gateway_core::{GatewayError, GatewayResult};
use gateway_resilience::{
    BlockingBridge, CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter,
    RateLimiterConfig, RetryPolicy,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_limiter_caps_caller_within_window() {
    let limiter = RateLimiter::new(
        "research",
        RateLimiterConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        },
    );

    assert!(limiter.check("u1").await);
    assert!(limiter.check("u1").await);
    assert!(!limiter.check("u1").await);

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(limiter.check("u1").await);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_probe_after_timeout() {
    let breaker = CircuitBreaker::new(
        "tavily",
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(5),
        },
    );

    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.can_execute());

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(breaker.can_execute());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

/// Runs a flaky blocking call through bridge + retry and records one breaker
/// outcome for the whole call.
async fn dispatch(
    bridge: &BlockingBridge,
    retry: &RetryPolicy,
    breaker: &CircuitBreaker,
    failures_before_success: u32,
    calls: Arc<AtomicU32>,
) -> GatewayResult<u32> {
    let outcome = retry
        .execute("search", |_| {
            let calls = Arc::clone(&calls);
            let submitted = bridge.submit(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures_before_success {
                    Err(GatewayError::provider("tavily", "timed out", None, true))
                } else {
                    Ok(n)
                }
            });
            async move { submitted?.await }
        })
        .await;

    match outcome.result {
        Ok(value) => {
            breaker.record_success();
            Ok(value)
        }
        Err(err) => {
            breaker.record_failure();
            Err(GatewayError::upstream("search", outcome.attempts, err))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_through_bridge_recovers() {
    let bridge = BlockingBridge::with_defaults();
    let retry = RetryPolicy::default();
    let breaker = CircuitBreaker::with_defaults("tavily");
    let calls = Arc::new(AtomicU32::new(0));

    let value = dispatch(&bridge, &retry, &breaker, 2, Arc::clone(&calls))
        .await
        .expect("recovered");

    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.stats().total_failures, 0);
    assert_eq!(breaker.stats().total_successes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_count_as_one_failure() {
    let bridge = BlockingBridge::with_defaults();
    let retry = RetryPolicy::default();
    let breaker = CircuitBreaker::with_defaults("tavily");
    let calls = Arc::new(AtomicU32::new(0));

    let err = dispatch(&bridge, &retry, &breaker, u32::MAX, Arc::clone(&calls))
        .await
        .expect_err("exhausted");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.stats().consecutive_failures, 1);
    match err {
        GatewayError::Upstream {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.is_transient());
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}
