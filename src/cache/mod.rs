//! Pull-model metadata caches.
//!
//! Two caches share the same [`CachedEntry`] state and the same rules: at
//! most one fetch in flight per instance, a failed fetch never erases the
//! last good value, and value and timestamp always change together.
//!
//! - [`TtlCache`] - refreshes inline under a write lock once the value is
//!   older than its TTL and returns fetch errors to the caller. Failures do
//!   not restart the TTL, so the next call retries straight away.
//!
//! - [`CoalescingCache`] - stale-while-revalidate: reads never wait, a stale
//!   read schedules a background refresh, and concurrent refreshes collapse
//!   into one fetch. Failures are logged, not returned; the cache reports
//!   health alongside the (possibly stale) value and waits a full interval
//!   before retrying.
//!
//! The push-model variant lives in [`crate::broadcast`].

pub mod coalesce;
mod entry;
pub mod ttl;

pub use coalesce::{CoalescingCache, CoalescingConfig, Collected};
pub use entry::CachedEntry;
pub use ttl::{TtlCache, TtlCacheConfig};
