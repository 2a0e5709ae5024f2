//! The state every cache variant holds for its one piece of metadata.

use std::time::Duration;

use tokio::time::Instant;

use crate::MetaError;

/// Last known-good value plus the bookkeeping around it.
///
/// Owned by exactly one cache and only mutated by that cache's refresh path
/// while it holds the write lock, so `value` and `fetched_at` always change
/// together.
///
/// - `value` is the most recent *successful* fetch, `None` if nothing has
///   succeeded yet. A failure never clears it.
/// - `fetched_at` is when the freshness window started. Whether a failure
///   moves it depends on the cache (see [`record_failure`](Self::record_failure)).
/// - `last_error` is the most recent failure, cleared on success.
#[derive(Debug, Clone)]
pub struct CachedEntry<V> {
    value: Option<V>,
    fetched_at: Option<Instant>,
    last_error: Option<MetaError>,
}

impl<V> Default for CachedEntry<V> {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            last_error: None,
        }
    }
}

impl<V: Clone> CachedEntry<V> {
    /// An entry that has never been fetched.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Last successfully fetched value.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Start of the current freshness window.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Most recent fetch failure, if the last attempt failed.
    pub fn last_error(&self) -> Option<&MetaError> {
        self.last_error.as_ref()
    }

    /// Time since the freshness window started.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.fetched_at.map(|at| now.saturating_duration_since(at))
    }

    /// Whether the entry is younger than `window` at `now`.
    ///
    /// A never-fetched entry is never fresh, and a zero window is never fresh.
    pub fn is_within(&self, window: Duration, now: Instant) -> bool {
        match self.age(now) {
            Some(age) => age < window,
            None => false,
        }
    }

    /// Store a successful fetch: new value, new window, error cleared.
    pub fn record_success(&mut self, value: V, now: Instant) {
        self.value = Some(value);
        self.fetched_at = Some(now);
        self.last_error = None;
    }

    /// Store a failed fetch. The value is always kept.
    ///
    /// With `advance_window` the freshness window restarts at `now`, deferring
    /// the next attempt by a full window; without it the entry stays stale
    /// and the next read retries.
    pub fn record_failure(&mut self, error: MetaError, now: Instant, advance_window: bool) {
        if advance_window {
            self.fetched_at = Some(now);
        }
        self.last_error = Some(error);
    }

    /// Forget the freshness window but keep the value.
    pub fn invalidate(&mut self) {
        self.fetched_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_error() -> MetaError {
        MetaError::Transport("connection refused".into())
    }

    #[test]
    fn empty_entry_is_never_fresh() {
        let entry = CachedEntry::<String>::empty();
        assert!(!entry.is_within(Duration::from_secs(60), Instant::now()));
        assert!(entry.value().is_none());
        assert!(entry.age(Instant::now()).is_none());
    }

    #[test]
    fn success_starts_window() {
        let now = Instant::now();
        let mut entry = CachedEntry::empty();
        entry.record_success("a".to_string(), now);
        assert!(entry.is_within(Duration::from_secs(1), now));
        assert!(!entry.is_within(Duration::from_secs(1), now + Duration::from_secs(1)));
        assert_eq!(entry.value().map(String::as_str), Some("a"));
    }

    #[test]
    fn zero_window_is_always_stale() {
        let now = Instant::now();
        let mut entry = CachedEntry::empty();
        entry.record_success(1u32, now);
        assert!(!entry.is_within(Duration::ZERO, now));
    }

    #[test]
    fn failure_keeps_value_and_window() {
        let t0 = Instant::now();
        let mut entry = CachedEntry::empty();
        entry.record_success(7u32, t0);

        let t1 = t0 + Duration::from_secs(10);
        entry.record_failure(transport_error(), t1, false);

        assert_eq!(entry.value(), Some(&7));
        assert_eq!(entry.fetched_at(), Some(t0));
        assert!(entry.last_error().is_some());
    }

    #[test]
    fn failure_can_advance_window() {
        let t0 = Instant::now();
        let mut entry = CachedEntry::<u32>::empty();
        entry.record_failure(transport_error(), t0, true);

        assert!(entry.value().is_none());
        assert_eq!(entry.fetched_at(), Some(t0));
        assert!(entry.is_within(Duration::from_secs(1), t0));
    }

    #[test]
    fn success_clears_error() {
        let t0 = Instant::now();
        let mut entry = CachedEntry::empty();
        entry.record_failure(transport_error(), t0, false);
        entry.record_success(1u32, t0);
        assert!(entry.last_error().is_none());
    }

    #[test]
    fn invalidate_keeps_value() {
        let t0 = Instant::now();
        let mut entry = CachedEntry::empty();
        entry.record_success(1u32, t0);
        entry.invalidate();
        assert!(!entry.is_within(Duration::from_secs(60), t0));
        assert_eq!(entry.value(), Some(&1));
    }
}
