//! Public types for the clustermeta API.

mod cluster;

pub use cluster::{ClusterInfo, UNKNOWN_CLUSTER_NAME, VersionInfo, cluster_label};
