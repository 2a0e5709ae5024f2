//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (e.g. the `--config` CLI flag)
//! 2. `~/.clustermeta/config.toml` (user)
//! 3. `/etc/clustermeta/config.toml` (system)
//!
//! Every section is optional except `[source] url`. A password left out of
//! the file is taken from `CLUSTERMETA_PASSWORD` when set.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BroadcastConfig, CoalescingConfig, HttpFetcherConfig, MetaError, Result, TtlCacheConfig};

/// Environment variable consulted when `[source] password` is absent.
pub const PASSWORD_ENV_VAR: &str = "CLUSTERMETA_PASSWORD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub broadcast: BroadcastSection,
    #[serde(default)]
    pub collector: CollectorSection,
}

/// Remote endpoint the metadata is fetched from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    #[serde(default)]
    pub url: Option<String>,
    /// Request path (default: `/`).
    #[serde(default = "default_path")]
    pub path: String,
    /// Request timeout in seconds (default: 5).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_path(),
            timeout_secs: default_timeout_secs(),
            username: None,
            password: None,
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

/// `[cache]`: synchronous TTL cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Freshness window in seconds (default: 300, 0 disables caching).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

/// `[broadcast]`: push-model broadcaster.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSection {
    /// Ticker interval in seconds (default: 300, 0 disables the ticker).
    #[serde(default = "default_ttl_secs")]
    pub interval_secs: u64,
    /// Trigger queue capacity (default: 1).
    #[serde(default = "default_trigger_buffer")]
    pub trigger_buffer: usize,
    /// Per-consumer buffer for `subscribe` (default: 4).
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// How long a publish may wait on a full consumer, in milliseconds.
    /// Unset never waits.
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            interval_secs: default_ttl_secs(),
            trigger_buffer: default_trigger_buffer(),
            subscriber_buffer: default_subscriber_buffer(),
            send_timeout_ms: None,
        }
    }
}

fn default_trigger_buffer() -> usize {
    crate::broadcast::DEFAULT_TRIGGER_BUFFER
}

fn default_subscriber_buffer() -> usize {
    crate::broadcast::DEFAULT_SUBSCRIBER_BUFFER
}

/// `[collector]`: coalescing stale-while-revalidate cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSection {
    /// Refresh interval in seconds (default: 60).
    #[serde(default = "default_collector_interval")]
    pub interval_secs: u64,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_collector_interval(),
        }
    }
}

fn default_collector_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.clustermeta/config.toml`
    /// 3. `/etc/clustermeta/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    /// Parse a config file at `path`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MetaError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MetaError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MetaError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".clustermeta").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/clustermeta/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MetaError::Configuration(
            "No config file found. Create ~/.clustermeta/config.toml or /etc/clustermeta/config.toml"
                .to_string(),
        ))
    }

    /// Fetcher settings for `[source]`.
    ///
    /// Fails when no URL is configured.
    pub fn fetcher_config(&self) -> Result<HttpFetcherConfig> {
        let url = self
            .source
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| MetaError::Configuration("[source] url is required".to_string()))?;

        let mut config = HttpFetcherConfig::new(url)
            .path(self.source.path.as_str())
            .timeout(Duration::from_secs(self.source.timeout_secs));

        if let Some(username) = &self.source.username {
            let password = self
                .source
                .password
                .clone()
                .or_else(|| std::env::var(PASSWORD_ENV_VAR).ok());
            config = config.basic_auth(username.as_str(), password.as_deref());
        }
        Ok(config)
    }

    /// Settings for [`TtlCache`](crate::TtlCache).
    pub fn ttl_cache_config(&self) -> TtlCacheConfig {
        TtlCacheConfig::new().ttl(Duration::from_secs(self.cache.ttl_secs))
    }

    /// Settings for [`Broadcaster`](crate::Broadcaster).
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig::new()
            .interval(Duration::from_secs(self.broadcast.interval_secs))
            .trigger_buffer(self.broadcast.trigger_buffer)
            .subscriber_buffer(self.broadcast.subscriber_buffer)
            .send_timeout(self.broadcast.send_timeout_ms.map(Duration::from_millis))
    }

    /// Settings for [`CoalescingCache`](crate::CoalescingCache).
    pub fn coalescing_config(&self) -> CoalescingConfig {
        CoalescingConfig::new().interval(Duration::from_secs(self.collector.interval_secs))
    }
}
