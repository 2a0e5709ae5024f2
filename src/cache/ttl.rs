//! Pull-model cache with a freshness window.
//!
//! [`TtlCache::get`] serves the held value while it is younger than the TTL
//! and otherwise refetches inline. Refreshes are serialised behind the write
//! lock: a caller that arrives mid-refresh waits for it, re-checks freshness,
//! and reuses the result instead of fetching again.
//!
//! A failed fetch is returned to the caller and does *not* restart the
//! freshness window, so the very next `get` retries. That includes callers
//! already queued on the lock: the failure is not shared with them, so each
//! one fetches in turn and gets its own result. The last good value is kept
//! and stays reachable through [`TtlCache::peek`].

use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::CachedEntry;
use crate::Result;
use crate::fetch::SharedFetcher;
use crate::telemetry;

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for [`TtlCache`].
///
/// ```rust
/// # use clustermeta::TtlCacheConfig;
/// # use std::time::Duration;
/// let config = TtlCacheConfig::new()
///     .name("cluster_info")
///     .ttl(Duration::from_secs(30));
/// assert_eq!(config.ttl, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    /// Cache name used in logs and metric labels. Default: `"cluster_info"`.
    pub name: String,
    /// Freshness window. Zero disables caching. Default: 5 minutes.
    pub ttl: Duration,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            name: "cluster_info".to_string(),
            ttl: DEFAULT_TTL,
        }
    }
}

impl TtlCacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the freshness window.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Synchronous-refresh TTL cache around a single fetcher.
pub struct TtlCache<V> {
    name: String,
    ttl: Duration,
    fetcher: SharedFetcher<V>,
    entry: RwLock<CachedEntry<V>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache that has not fetched anything yet.
    pub fn new(fetcher: SharedFetcher<V>, config: &TtlCacheConfig) -> Self {
        Self {
            name: config.name.clone(),
            ttl: config.ttl,
            fetcher,
            entry: RwLock::new(CachedEntry::empty()),
        }
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value, refetching first if it is stale.
    ///
    /// Fresh hits only take the read lock. On a stale entry the caller takes
    /// the write lock, re-checks (another caller may have just refreshed) and
    /// fetches if still needed. Fetch errors are returned as-is and recorded;
    /// the previous value is left in place.
    pub async fn get(&self) -> Result<V> {
        {
            let entry = self.entry.read().await;
            if let Some(value) = self.fresh_value(&entry, Instant::now()) {
                return Ok(value);
            }
        }

        let mut entry = self.entry.write().await;
        if let Some(value) = self.fresh_value(&entry, Instant::now()) {
            debug!(cache = %self.name, "refreshed by a concurrent caller");
            return Ok(value);
        }

        debug!(cache = %self.name, "refreshing stale entry");
        let start = Instant::now();
        let result = self.fetcher.fetch().await;
        let elapsed = start.elapsed().as_secs_f64();
        telemetry::record_fetch(&self.name, elapsed, result.is_ok());

        match result {
            Ok(value) => {
                entry.record_success(value.clone(), Instant::now());
                Ok(value)
            }
            Err(e) => {
                warn!(
                    cache = %self.name,
                    kind = e.kind(),
                    has_previous = entry.value().is_some(),
                    error = %e,
                    "metadata fetch failed"
                );
                entry.record_failure(e.clone(), Instant::now(), false);
                Err(e)
            }
        }
    }

    /// Last good value, without fetching and regardless of age.
    pub async fn peek(&self) -> Option<V> {
        self.entry.read().await.value().cloned()
    }

    /// Most recent fetch error, cleared by the next success.
    pub async fn last_error(&self) -> Option<crate::MetaError> {
        self.entry.read().await.last_error().cloned()
    }

    /// When the current value was fetched.
    pub async fn fetched_at(&self) -> Option<Instant> {
        self.entry.read().await.fetched_at()
    }

    /// Mark the entry stale so the next [`get`](Self::get) refetches.
    ///
    /// The held value survives and is still returned by [`peek`](Self::peek).
    pub async fn invalidate(&self) {
        self.entry.write().await.invalidate();
    }

    fn fresh_value(&self, entry: &CachedEntry<V>, now: Instant) -> Option<V> {
        if entry.last_error().is_some() || !entry.is_within(self.ttl, now) {
            return None;
        }
        entry.value().cloned()
    }
}
