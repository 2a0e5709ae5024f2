//! Telemetry metric name constants.
//!
//! Centralised metric names for the caches in this crate. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `clustermeta_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `cache` - name of the cache instance (e.g. "cluster_info")
//! - `status` - outcome: "ok" or "error"
//! - `subscriber` - broadcaster consumer name

/// Total fetches performed against the backend.
///
/// Labels: `cache`, `status` ("ok" | "error").
pub const FETCHES_TOTAL: &str = "clustermeta_fetches_total";

/// Fetch duration in seconds.
///
/// Labels: `cache`.
pub const FETCH_DURATION_SECONDS: &str = "clustermeta_fetch_duration_seconds";

/// Whether the most recent fetch succeeded (1) or failed (0).
///
/// Labels: `cache`.
pub const UP: &str = "clustermeta_up";

/// Unix timestamp of the most recent successful fetch.
///
/// Labels: `cache`.
pub const LAST_SUCCESS_TIMESTAMP_SECONDS: &str = "clustermeta_last_success_timestamp_seconds";

/// Total values handed to broadcaster consumers.
///
/// Labels: `subscriber`, `status` ("ok" | "lagged" | "closed").
pub const PUBLISH_TOTAL: &str = "clustermeta_publish_total";

/// Total publishes dropped because a consumer's buffer was full.
///
/// Labels: `subscriber`.
pub const SUBSCRIBER_LAGGED_TOTAL: &str = "clustermeta_subscriber_lagged_total";

/// Record the outcome of one backend fetch.
pub(crate) fn record_fetch(cache: &str, elapsed_secs: f64, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(FETCHES_TOTAL,
        "cache" => cache.to_owned(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(FETCH_DURATION_SECONDS, "cache" => cache.to_owned()).record(elapsed_secs);
    metrics::gauge!(UP, "cache" => cache.to_owned()).set(if ok { 1.0 } else { 0.0 });
    if ok {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        metrics::gauge!(LAST_SUCCESS_TIMESTAMP_SECONDS, "cache" => cache.to_owned()).set(now);
    }
}
