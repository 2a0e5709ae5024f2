//! Fetchers: the one network round-trip every cache wraps.
//!
//! A [`MetadataFetcher`] performs a single idempotent fetch of the
//! authoritative metadata. The caches in [`crate::cache`] and
//! [`crate::broadcast`] decide *when* to call it; the fetcher only knows
//! *how*.
//!
//! [`HttpFetcher`] is the bundled implementation: it GETs a JSON document and
//! decodes it with serde, mapping failures onto the
//! transport / status / decode split of [`MetaError`](crate::MetaError).

pub mod http;

pub use http::{HttpFetcher, HttpFetcherConfig};

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// Performs one fetch of the metadata value.
///
/// Implementations should be idempotent and cheap to call concurrently; the
/// caches guarantee at most one call in flight per cache instance, but a
/// fetcher shared between caches may see parallel calls. Any timeout belongs
/// here: the caches never impose one of their own.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Value produced by a successful fetch.
    type Value: Clone + Send + Sync + 'static;

    /// Fetch the current value from the backend.
    async fn fetch(&self) -> Result<Self::Value>;
}

/// Shared, type-erased fetcher as stored by the caches.
pub type SharedFetcher<V> = Arc<dyn MetadataFetcher<Value = V>>;

