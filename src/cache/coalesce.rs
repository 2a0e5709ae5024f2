//! Stale-while-revalidate cache with request coalescing.
//!
//! [`CoalescingCache::collect`] never waits on the network: it hands back
//! whatever is held and, when the held value is older than the refresh
//! interval, kicks off a background refresh. All refreshes go through one
//! single-flight group keyed by the cache name, so any number of concurrent
//! triggers share a single fetch. The flight re-checks staleness before
//! fetching, which closes the gap between "looks stale" and "start a
//! refresh" when a trigger races a refresh that just finished.
//!
//! Unlike [`TtlCache`](super::TtlCache), a failed refresh still restarts the
//! interval: the next attempt waits a full interval, protecting a struggling
//! backend from a retry storm. The held value survives and
//! [`Collected::healthy`] turns false until a refresh succeeds again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use singleflight_async::SingleFlight;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::CachedEntry;
use crate::fetch::SharedFetcher;
use crate::{MetaError, telemetry};

/// Default refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for [`CoalescingCache`].
#[derive(Debug, Clone)]
pub struct CoalescingConfig {
    /// Cache name, used as the single-flight key and in logs/metrics.
    /// Default: `"cluster_info"`.
    pub name: String,
    /// Minimum time between refresh attempts. Default: 60s.
    pub interval: Duration,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self {
            name: "cluster_info".to_string(),
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl CoalescingConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the refresh interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// What a read returns: the held value, possibly stale, plus its health.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<V> {
    /// Last successfully fetched value, `None` if nothing has succeeded yet.
    pub value: Option<V>,
    /// Whether the most recent refresh succeeded. False before the first
    /// refresh completes.
    pub healthy: bool,
    /// Time since the last refresh attempt.
    pub age: Option<Duration>,
    /// Error of the most recent refresh, if it failed.
    pub last_error: Option<MetaError>,
}

/// Outcome shared by every caller attached to one flight.
type FetchOutcome<V> = std::result::Result<V, MetaError>;

struct Inner<V> {
    name: String,
    interval: Duration,
    fetcher: SharedFetcher<V>,
    entry: RwLock<CachedEntry<V>>,
    flights: SingleFlight<FetchOutcome<V>>,
    // Set while a background refresh task exists; stale reads skip spawning.
    refresh_pending: AtomicBool,
}

/// Clears the pending flag when the background task ends, even by panic.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Non-blocking cache with background, coalesced refreshes.
///
/// Cheap to clone; clones share state.
pub struct CoalescingCache<V>(Arc<Inner<V>>);

impl<V> Clone for CoalescingCache<V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<V> CoalescingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache that has not fetched anything yet.
    ///
    /// The first [`collect`](Self::collect) triggers the first refresh.
    pub fn new(fetcher: SharedFetcher<V>, config: &CoalescingConfig) -> Self {
        Self(Arc::new(Inner {
            name: config.name.clone(),
            interval: config.interval,
            fetcher,
            entry: RwLock::new(CachedEntry::empty()),
            flights: SingleFlight::default(),
            refresh_pending: AtomicBool::new(false),
        }))
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Configured refresh interval.
    pub fn interval(&self) -> Duration {
        self.0.interval
    }

    /// Return the held value immediately, scheduling a refresh if it is stale.
    ///
    /// Must be called from within a tokio runtime for the refresh to be
    /// scheduled; outside one the held value is still returned.
    pub fn collect(&self) -> Collected<V> {
        let now = Instant::now();
        let (collected, stale) = {
            let entry = self.0.read();
            (snapshot(&entry, now), !entry.is_within(self.0.interval, now))
        };

        if stale {
            self.spawn_refresh();
        }
        collected
    }

    /// Whether the most recent refresh succeeded.
    pub fn is_healthy(&self) -> bool {
        snapshot(&self.0.read(), Instant::now()).healthy
    }

    /// Force a refresh and wait for its outcome.
    ///
    /// If a refresh is already in flight this attaches to it instead of
    /// starting another one.
    pub async fn refresh(&self) -> crate::Result<V> {
        let inner = &self.0;
        inner
            .flights
            .work(inner.name.as_str(), || inner.fetch_and_store())
            .await
    }

    fn spawn_refresh(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(cache = %self.0.name, "no tokio runtime, skipping background refresh");
            return;
        };

        if self.0.refresh_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = self.0.clone();
        handle.spawn(async move {
            let _pending = PendingGuard(&inner.refresh_pending);
            // Errors are already logged and recorded by the flight leader.
            let _ = inner.refresh_if_stale().await;
        });
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn read(&self) -> RwLockReadGuard<'_, CachedEntry<V>> {
        self.entry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CachedEntry<V>> {
        self.entry.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh_if_stale(&self) -> FetchOutcome<V> {
        self.flights
            .work(self.name.as_str(), || async {
                let current = {
                    let entry = self.read();
                    entry
                        .is_within(self.interval, Instant::now())
                        .then(|| last_outcome(&entry))
                };
                match current {
                    Some(outcome) => {
                        debug!(cache = %self.name, "already refreshed, skipping fetch");
                        outcome
                    }
                    None => self.fetch_and_store().await,
                }
            })
            .await
    }

    async fn fetch_and_store(&self) -> FetchOutcome<V> {
        debug!(cache = %self.name, "refreshing in background");
        let start = Instant::now();
        let result = self.fetcher.fetch().await;
        telemetry::record_fetch(&self.name, start.elapsed().as_secs_f64(), result.is_ok());

        {
            let mut entry = self.write();
            match &result {
                Ok(value) => entry.record_success(value.clone(), Instant::now()),
                Err(e) => {
                    warn!(
                        cache = %self.name,
                        kind = e.kind(),
                        retry_in_secs = self.interval.as_secs(),
                        error = %e,
                        "background refresh failed, serving previous value"
                    );
                    entry.record_failure(e.clone(), Instant::now(), true);
                }
            }
        }
        result
    }
}

fn snapshot<V: Clone>(entry: &CachedEntry<V>, now: Instant) -> Collected<V> {
    Collected {
        value: entry.value().cloned(),
        healthy: entry.fetched_at().is_some() && entry.last_error().is_none(),
        age: entry.age(now),
        last_error: entry.last_error().cloned(),
    }
}

fn last_outcome<V: Clone>(entry: &CachedEntry<V>) -> FetchOutcome<V> {
    match (entry.value(), entry.last_error()) {
        (_, Some(e)) => Err(e.clone()),
        (Some(value), None) => Ok(value.clone()),
        (None, None) => Err(MetaError::NotYetFetched),
    }
}
