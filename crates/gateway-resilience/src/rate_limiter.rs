//! Rate limiting using a sliding-window log.
//!
//! Each key keeps the timestamps of its admitted requests inside the trailing
//! window. Timestamps that fall out of the window are pruned lazily on every
//! check. Keys left with an empty log are swept during admission at most once
//! per window, so the map only holds callers seen in roughly the last two
//! windows.

use gateway_core::GatewayError;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window duration
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Admission log for a single key
#[derive(Debug, Default)]
struct WindowLog {
    /// Admission times, oldest first
    admitted: VecDeque<Instant>,
}

impl WindowLog {
    /// Drop timestamps that are no longer inside the window
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until the oldest retained admission leaves the window
    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        self.admitted
            .front()
            .map_or(Duration::ZERO, |oldest| {
                window.saturating_sub(now.duration_since(*oldest))
            })
    }
}

/// Admission logs for all keys
#[derive(Debug)]
struct WindowLogs {
    logs: HashMap<String, WindowLog>,
    /// Earliest time the next idle-key sweep may run
    next_sweep: Instant,
}

impl WindowLogs {
    /// Drop keys whose logs are empty once pruned, returning how many went
    fn sweep(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.logs.len();
        self.logs.retain(|_, log| {
            log.prune(now, window);
            !log.admitted.is_empty()
        });
        self.next_sweep = now + window;
        before - self.logs.len()
    }
}

/// Window statistics for a key
#[derive(Debug, Clone)]
pub struct WindowStats {
    /// Requests admitted in the current window
    pub admitted: u32,
    /// Requests still allowed in the current window
    pub remaining: u32,
    /// Requests allowed per window
    pub max_requests: u32,
    /// Time until the next slot frees up (zero if one is free)
    pub reset_after: Duration,
}

impl WindowStats {
    /// Calculate window utilization percentage
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max_requests == 0 {
            return 0.0;
        }
        f64::from(self.admitted) / f64::from(self.max_requests) * 100.0
    }
}

/// Per-key sliding-window rate limiter
pub struct RateLimiter {
    /// Identifier
    id: String,
    /// Configuration
    config: RateLimiterConfig,
    /// Per-key admission logs
    windows: Arc<Mutex<WindowLogs>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(id: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            id: id.into(),
            windows: Arc::new(Mutex::new(WindowLogs {
                logs: HashMap::new(),
                next_sweep: Instant::now() + config.window,
            })),
            config,
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(id: impl Into<String>) -> Self {
        Self::new(id, RateLimiterConfig::default())
    }

    /// Get the rate limiter ID
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Check and record a request for `key`
    ///
    /// Returns `true` and records the request if the key is under its cap,
    /// `false` otherwise. Pruning, counting and recording happen under one
    /// lock, so two callers can never both take the last slot.
    pub async fn check(&self, key: &str) -> bool {
        self.try_admit(key).await.is_ok()
    }

    /// Check and record a request, failing with a rate limit error
    ///
    /// # Errors
    /// Returns `GatewayError::RateLimit` carrying the time until a slot frees
    pub async fn acquire(&self, key: &str) -> Result<(), GatewayError> {
        self.try_admit(key).await.map_err(|retry_after| {
            GatewayError::rate_limit(Some(retry_after), Some(self.config.max_requests))
        })
    }

    async fn try_admit(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if now >= windows.next_sweep {
            let removed = windows.sweep(now, self.config.window);
            if removed > 0 {
                debug!(rate_limiter = %self.id, removed, "Swept idle rate limit keys");
            }
        }

        let log = windows.logs.entry(key.to_string()).or_default();
        log.prune(now, self.config.window);

        if log.admitted.len() >= self.config.max_requests as usize {
            let retry_after = log.retry_after(now, self.config.window);
            warn!(
                rate_limiter = %self.id,
                key = %key,
                limit = self.config.max_requests,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            return Err(retry_after);
        }

        log.admitted.push_back(now);
        debug!(
            rate_limiter = %self.id,
            key = %key,
            admitted = log.admitted.len(),
            "Rate limit check passed"
        );
        Ok(())
    }

    /// Requests still allowed for `key` in the current window
    pub async fn remaining(&self, key: &str) -> u32 {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let Some(log) = windows.logs.get_mut(key) else {
            return self.config.max_requests;
        };
        log.prune(now, self.config.window);
        let used = u32::try_from(log.admitted.len()).unwrap_or(u32::MAX);
        self.config.max_requests.saturating_sub(used)
    }

    /// Get statistics for a specific key
    pub async fn stats(&self, key: &str) -> Option<WindowStats> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let log = windows.logs.get_mut(key)?;
        log.prune(now, self.config.window);

        let admitted = u32::try_from(log.admitted.len()).unwrap_or(u32::MAX);
        let remaining = self.config.max_requests.saturating_sub(admitted);
        let reset_after = if remaining > 0 {
            Duration::ZERO
        } else {
            log.retry_after(now, self.config.window)
        };

        Some(WindowStats {
            admitted,
            remaining,
            max_requests: self.config.max_requests,
            reset_after,
        })
    }

    /// Drop keys with no admissions left in the window right away
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let removed = self.windows.lock().await.sweep(now, self.config.window);
        if removed > 0 {
            debug!(
                rate_limiter = %self.id,
                removed,
                "Cleaned up idle rate limit keys"
            );
        }
    }

    /// Get number of tracked keys
    pub async fn key_count(&self) -> usize {
        self.windows.lock().await.logs.len()
    }
}
