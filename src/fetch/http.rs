//! HTTP fetcher for JSON metadata documents.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::MetadataFetcher;
use crate::types::ClusterInfo;
use crate::{MetaError, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`HttpFetcher`].
///
/// ```rust
/// # use clustermeta::HttpFetcherConfig;
/// # use std::time::Duration;
/// let config = HttpFetcherConfig::new("http://localhost:9200")
///     .path("/")
///     .timeout(Duration::from_secs(2))
///     .basic_auth("elastic", Some("changeme"));
/// assert_eq!(config.url(), "http://localhost:9200/");
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Base URL of the backend, without trailing slash.
    pub base_url: String,
    /// Path of the metadata document. Default: `/`.
    pub path: String,
    /// Per-request timeout. Default: 5s.
    pub timeout: Duration,
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl HttpFetcherConfig {
    /// Create a config for the given base URL with default path and timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            path: "/".to_string(),
            timeout: DEFAULT_TIMEOUT,
            username: None,
            password: None,
        }
    }

    /// Set the document path (a leading `/` is added if missing).
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Authenticate with HTTP basic auth.
    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<&str>) -> Self {
        self.username = Some(username.into());
        self.password = password.map(str::to_string);
        self
    }

    /// Full URL of the metadata document.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

/// Fetches a JSON document over HTTP and decodes it into `T`.
///
/// Defaults to [`ClusterInfo`], the root document of the backend. Errors map
/// onto three kinds:
///
/// - connect / DNS / timeout / body read → [`MetaError::Transport`]
/// - non-2xx status → [`MetaError::Status`]
/// - body that does not decode into `T` → [`MetaError::Decode`]
pub struct HttpFetcher<T = ClusterInfo> {
    http: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    _value: PhantomData<fn() -> T>,
}

impl<T> HttpFetcher<T> {
    /// Build a fetcher with its own HTTP client.
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MetaError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, config))
    }

    /// Build a fetcher around an existing client (connection pools are shared).
    ///
    /// The client's own timeout applies; `config.timeout` is ignored.
    pub fn with_client(http: Client, config: HttpFetcherConfig) -> Self {
        Self {
            url: config.url(),
            http,
            username: config.username,
            password: config.password,
            _value: PhantomData,
        }
    }

    /// URL this fetcher requests.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<T> MetadataFetcher for HttpFetcher<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Value = T;

    async fn fetch(&self) -> Result<T> {
        let mut request = self.http.get(&self.url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetaError::Transport(format!("GET {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetaError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().await.map_err(|e| {
            MetaError::Transport(format!("failed to read body from {}: {e}", self.url))
        })?;
        debug!(url = %self.url, bytes = body.len(), "fetched metadata document");

        serde_json::from_str(&body)
            .map_err(|e| MetaError::Decode(format!("invalid document from {}: {e}", self.url)))
    }
}
