//! Cluster metadata returned by the backend's root endpoint.
//!
//! These are the values the caches hand out. Scrapers attach
//! [`ClusterInfo::cluster_name`] as a label to every metric they emit, and
//! fall back to [`UNKNOWN_CLUSTER_NAME`] when nothing has been fetched yet.

use serde::{Deserialize, Serialize};

/// Label value used when no cluster metadata has ever been fetched.
pub const UNKNOWN_CLUSTER_NAME: &str = "unknown_cluster";

/// Cluster identity and version, as served by `GET /`.
///
/// Only `cluster_name` is required; every other field defaults when absent so
/// that older or trimmed-down backends still decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Name of the node that answered the request.
    #[serde(default)]
    pub name: String,
    /// Cluster name; the label scrapers care about.
    pub cluster_name: String,
    /// Cluster UUID.
    #[serde(default)]
    pub cluster_uuid: String,
    /// Version block.
    #[serde(default)]
    pub version: VersionInfo,
}

/// Version details of the answering node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub build_flavor: String,
    #[serde(default)]
    pub build_type: String,
    #[serde(default)]
    pub build_hash: String,
    #[serde(default)]
    pub build_date: String,
    #[serde(default)]
    pub build_snapshot: bool,
    #[serde(default)]
    pub lucene_version: String,
}

impl ClusterInfo {
    /// Create cluster info with just a name (mostly useful in tests).
    pub fn named(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ..Default::default()
        }
    }
}

/// Cluster label for metrics, falling back to [`UNKNOWN_CLUSTER_NAME`].
///
/// An empty name counts as unknown.
///
/// ```rust
/// # use clustermeta::{ClusterInfo, cluster_label, UNKNOWN_CLUSTER_NAME};
/// assert_eq!(cluster_label(None), UNKNOWN_CLUSTER_NAME);
/// let info = ClusterInfo::named("prod-eu");
/// assert_eq!(cluster_label(Some(&info)), "prod-eu");
/// ```
pub fn cluster_label(info: Option<&ClusterInfo>) -> &str {
    match info {
        Some(info) if !info.cluster_name.is_empty() => &info.cluster_name,
        _ => UNKNOWN_CLUSTER_NAME,
    }
}
