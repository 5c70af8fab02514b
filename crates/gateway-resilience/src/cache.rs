//! Result caching for idempotent read operations.
//!
//! Provides an in-memory, process-local cache of successful results so that
//! structurally identical requests made within the TTL hit the upstream only
//! once. Keys are a SHA-256 digest over the operation name and the canonical
//! JSON form of the normalized request.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// TTL for cache entries
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// A cached entry
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    /// Access sequence number for LRU ordering
    last_access: u64,
    hits: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.created_at) >= ttl
    }
}

/// Cache key derived from an operation and its normalized request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from an operation name and a serializable request
    ///
    /// The request is converted to a `serde_json::Value` first; its object
    /// maps are ordered by key, so field order never affects the digest.
    ///
    /// # Errors
    /// Returns an error if the request cannot be represented as JSON
    pub fn for_request<T: Serialize>(
        operation: &str,
        request: &T,
    ) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_value(request)?;
        let body = serde_json::to_string(&canonical)?;

        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update(b":");
        hasher.update(body.as_bytes());
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Current number of entries
    pub entries: usize,
    /// Number of evictions (expired or LRU)
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    stats: CacheStats,
    access_seq: u64,
}

impl<V> CacheState<V> {
    fn next_access(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }
}

/// TTL cache with bounded capacity
pub struct ResponseCache<V> {
    config: CacheConfig,
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V: Clone + Send> ResponseCache<V> {
    /// Create a new response cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                access_seq: 0,
            })),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Create a disabled cache
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            ..Default::default()
        })
    }

    /// Check if caching is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a value; expired entries read as absent and are discarded
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let seq = state.next_access();

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now, self.config.ttl) => {
                entry.hits += 1;
                entry.last_access = seq;
                let value = entry.value.clone();
                let hits = entry.hits;
                state.stats.hits += 1;
                debug!(key = %key, hits, "Cache hit");
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.evictions += 1;
            state.stats.entries = state.entries.len();
            debug!(key = %key, "Cache miss (expired)");
        } else {
            debug!(key = %key, "Cache miss");
        }
        state.stats.misses += 1;
        None
    }

    /// Store a value, evicting if the cache is full
    pub async fn put(&self, key: CacheKey, value: V) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_entries {
            self.evict(&mut state, now);
        }

        let seq = state.next_access();
        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_access: seq,
                hits: 0,
            },
        );
        state.stats.entries = state.entries.len();

        debug!(entries = state.stats.entries, "Result cached");
    }

    /// Sweep expired entries, then drop the least recently used until there
    /// is room for one more
    fn evict(&self, state: &mut CacheState<V>, now: Instant) {
        let ttl = self.config.ttl;
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let removed_expired = before - state.entries.len();

        while state.entries.len() >= self.config.max_entries {
            let lru = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            match lru {
                Some(key) => {
                    state.entries.remove(&key);
                }
                None => break,
            }
        }

        let removed = before - state.entries.len();
        state.stats.evictions += removed as u64;

        if removed > 0 {
            info!(
                removed_expired,
                removed_total = removed,
                "Cache eviction completed"
            );
        }
    }

    /// Remove a single entry
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.entries.remove(key).is_some();
        state.stats.entries = state.entries.len();
        removed
    }

    /// Clear all cache entries
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.stats.entries = 0;

        info!("Cache cleared");
    }

    /// Remove expired entries
    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let mut state = self.state.lock().await;

        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let removed = before - state.entries.len();

        state.stats.entries = state.entries.len();
        state.stats.evictions += removed as u64;

        if removed > 0 {
            debug!(removed, "Expired cache entries removed");
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }
}

/// Cache lookup result for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookupResult {
    /// Cache hit
    Hit,
    /// Cache miss
    Miss,
    /// Operation not cacheable
    NotCacheable,
    /// Cache disabled
    Disabled,
}

impl CacheLookupResult {
    /// Metric label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::NotCacheable => "not_cacheable",
            Self::Disabled => "disabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::advance;

    fn key(text: &str) -> CacheKey {
        CacheKey::for_request("search", &json!({ "query": text })).expect("key")
    }

    fn small_cache(max_entries: usize) -> ResponseCache<String> {
        ResponseCache::new(CacheConfig {
            enabled: true,
            max_entries,
            ttl: Duration::from_secs(3600),
        })
    }

    #[tokio::test]
    async fn test_cache_hit_and_miss() {
        let cache = ResponseCache::with_defaults();

        assert!(cache.get(&key("hello")).await.is_none());
        cache.put(key("hello"), "world".to_string()).await;
        assert_eq!(cache.get(&key("hello")).await.as_deref(), Some("world"));
        assert!(cache.get(&key("goodbye")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry() {
        let cache = ResponseCache::with_defaults();
        cache.put(key("q"), 1_u32).await;

        advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get(&key("q")).await, Some(1));

        advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("q")).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let cache = ResponseCache::disabled();
        cache.put(key("q"), "v".to_string()).await;
        assert!(cache.get(&key("q")).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = ResponseCache::with_defaults();

        cache.get(&key("q")).await;
        cache.put(key("q"), "v".to_string()).await;
        cache.get(&key("q")).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = small_cache(2);

        cache.put(key("first"), "1".to_string()).await;
        cache.put(key("second"), "2".to_string()).await;

        // Touch first so second becomes least recently used
        assert!(cache.get(&key("first")).await.is_some());
        cache.put(key("third"), "3".to_string()).await;

        assert!(cache.get(&key("second")).await.is_none());
        assert!(cache.get(&key("first")).await.is_some());
        assert!(cache.get(&key("third")).await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted_before_lru() {
        let cache = ResponseCache::new(CacheConfig {
            enabled: true,
            max_entries: 2,
            ttl: Duration::from_secs(10),
        });

        cache.put(key("old"), 1_u32).await;
        advance(Duration::from_secs(6)).await;
        cache.put(key("recent"), 2_u32).await;
        advance(Duration::from_secs(5)).await;

        cache.put(key("new"), 3_u32).await;
        assert_eq!(cache.get(&key("recent")).await, Some(2));
        assert_eq!(cache.get(&key("new")).await, Some(3));
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = small_cache(2);
        cache.put(key("a"), "1".to_string()).await;
        cache.put(key("b"), "2".to_string()).await;
        cache.put(key("a"), "3".to_string()).await;

        assert_eq!(cache.get(&key("a")).await.as_deref(), Some("3"));
        assert!(cache.get(&key("b")).await.is_some());
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = ResponseCache::with_defaults();
        cache.put(key("a"), 1_u8).await;
        cache.put(key("b"), 2_u8).await;

        assert!(cache.invalidate(&key("a")).await);
        assert!(!cache.invalidate(&key("a")).await);
        assert!(cache.get(&key("b")).await.is_some());

        cache.clear().await;
        assert!(cache.get(&key("b")).await.is_none());
    }

    #[test]
    fn test_cache_key_ignores_field_order() {
        let a = CacheKey::for_request("search", &json!({"query": "x", "max_results": 5}))
            .expect("key");
        let b = CacheKey::for_request("search", &json!({"max_results": 5, "query": "x"}))
            .expect("key");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_cache_key_includes_operation() {
        let request = json!({"query": "x"});
        let search = CacheKey::for_request("search", &request).expect("key");
        let research = CacheKey::for_request("research", &request).expect("key");
        assert_ne!(search, research);
    }
}
