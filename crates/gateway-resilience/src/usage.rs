//! Cached view of upstream credit usage.
//!
//! Fetches go through an async gate so only one request to the usage
//! endpoint is ever in flight; callers queued behind it reuse the snapshot
//! it produced. `clear_cache` is synchronous and never waits on the gate. A
//! generation counter makes sure a fetch that was overtaken by a clear does
//! not resurrect the stale snapshot.

use gateway_core::{GatewayResult, RemainingCredits, UsageBreakdown, UsageSnapshot, UsageSource};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Single-flight cache in front of a [`UsageSource`]
pub struct UsageTracker {
    source: Arc<dyn UsageSource>,
    snapshot: RwLock<Option<Arc<UsageSnapshot>>>,
    fetch_gate: Mutex<()>,
    generation: AtomicU64,
}

impl UsageTracker {
    /// Create a tracker over the given source
    #[must_use]
    pub fn new(source: Arc<dyn UsageSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            fetch_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cached snapshot, if any, without I/O
    #[must_use]
    pub fn cached(&self) -> Option<Arc<UsageSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Get a usage snapshot
    ///
    /// Returns the cached snapshot unless `force` is set or nothing is
    /// cached.
    ///
    /// # Errors
    /// Returns the source's error if a fetch was needed and failed
    pub async fn fetch(&self, force: bool) -> GatewayResult<Arc<UsageSnapshot>> {
        let _gate = self.fetch_gate.lock().await;

        if !force {
            if let Some(snapshot) = self.cached() {
                debug!("Usage served from cache");
                return Ok(snapshot);
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        let snapshot = Arc::new(self.source.fetch_usage().await?);

        if self.generation.load(Ordering::Acquire) == generation {
            *self.snapshot.write() = Some(Arc::clone(&snapshot));
        } else {
            debug!("Usage cache cleared during fetch, not storing snapshot");
        }

        info!(
            key_remaining = snapshot.key.remaining(),
            plan_remaining = snapshot.account.plan_remaining(),
            plan = %snapshot.account.current_plan,
            "Usage fetched"
        );
        Ok(snapshot)
    }

    /// Remaining credits for key, plan and pay-as-you-go
    ///
    /// # Errors
    /// Returns the source's error if a fetch was needed and failed
    pub async fn get_remaining(&self) -> GatewayResult<RemainingCredits> {
        Ok(self.fetch(false).await?.remaining())
    }

    /// Per-operation usage for key and account
    ///
    /// # Errors
    /// Returns the source's error if a fetch was needed and failed
    pub async fn get_breakdown(&self) -> GatewayResult<UsageBreakdown> {
        Ok(self.fetch(false).await?.breakdown())
    }

    /// Whether the key has at least `count` credits left
    ///
    /// # Errors
    /// Returns the source's error if a fetch was needed and failed
    pub async fn can_use(&self, operation: &str, count: u64) -> GatewayResult<bool> {
        let remaining = self.fetch(false).await?.key.remaining();
        if remaining < count {
            warn!(operation, remaining, requested = count, "Insufficient credits");
            return Ok(false);
        }
        Ok(true)
    }

    /// Drop the cached snapshot so the next read fetches fresh data
    pub fn clear_cache(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.snapshot.write() = None;
    }
}
