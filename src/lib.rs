//! clustermeta - refresh-and-distribution caches for remote metadata
//!
//! This crate fetches an expensive, slowly-changing piece of remote state
//! (typically the cluster identity of a search backend) and hands it to
//! many concurrent consumers without redundant network calls, without
//! blocking readers on a refresh, and without losing the last good value
//! when a refresh fails.
//!
//! Three delivery policies share one fetcher trait and one set of rules:
//!
//! - [`TtlCache`]: pull, refreshes inline once the value is older than its TTL
//! - [`Broadcaster`]: push, fetches on demand or on a timer and fans the
//!   value out to named consumers
//! - [`CoalescingCache`]: pull, stale-while-revalidate with coalesced
//!   background refreshes and a health flag
//!
//! # TTL Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use clustermeta::{ClusterInfo, HttpFetcher, HttpFetcherConfig, TtlCache, TtlCacheConfig};
//!
//! #[tokio::main]
//! async fn main() -> clustermeta::Result<()> {
//!     let fetcher = HttpFetcher::<ClusterInfo>::new(HttpFetcherConfig::new("http://localhost:9200"))?;
//!     let cache = TtlCache::new(Arc::new(fetcher), &TtlCacheConfig::new().ttl(Duration::from_secs(300)));
//!
//!     let info = cache.get().await?;
//!     println!("cluster: {}", info.cluster_name);
//!     Ok(())
//! }
//! ```
//!
//! # Broadcast Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clustermeta::{BroadcastConfig, Broadcaster, ClusterInfo, HttpFetcher, HttpFetcherConfig};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> clustermeta::Result<()> {
//!     let fetcher = HttpFetcher::<ClusterInfo>::new(HttpFetcherConfig::new("http://localhost:9200"))?;
//!     let broadcaster = Broadcaster::new(Arc::new(fetcher), &BroadcastConfig::new());
//!
//!     let (tx, mut rx) = mpsc::channel(1);
//!     broadcaster.register_consumer("node_stats", tx)?;
//!
//!     let shutdown = CancellationToken::new();
//!     tokio::spawn({
//!         let broadcaster = broadcaster.clone();
//!         let shutdown = shutdown.clone();
//!         async move { broadcaster.run(shutdown).await }
//!     });
//!
//!     if let Some(info) = rx.recv().await {
//!         println!("cluster: {}", info.cluster_name);
//!     }
//!     shutdown.cancel();
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{MetaError, Result};
pub use fetch::{HttpFetcher, HttpFetcherConfig, MetadataFetcher, SharedFetcher};

pub use broadcast::{BroadcastConfig, Broadcaster, BroadcasterState};
pub use cache::{
    CachedEntry, CoalescingCache, CoalescingConfig, Collected, TtlCache, TtlCacheConfig,
};
pub use config::Config;

pub use types::{ClusterInfo, UNKNOWN_CLUSTER_NAME, VersionInfo, cluster_label};
pub use version::PKG_VERSION;
