//! clustermeta - fetch, watch and poll cluster metadata.
//!
//! Exercises the three caches against a live endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use clustermeta::{
    Broadcaster, ClusterInfo, CoalescingCache, Config, HttpFetcher, SharedFetcher, TtlCache,
    cluster_label,
};

/// Cluster metadata cache CLI
#[derive(Parser)]
#[command(name = "clustermeta")]
#[command(version = clustermeta::PKG_VERSION)]
#[command(about = "Fetch and distribute cluster metadata")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides `[source] url`).
    #[arg(short, long, env = "CLUSTERMETA_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch once and print the cluster label
    Get,

    /// Run a broadcaster and log every published value until Ctrl-C
    Watch {
        /// Refresh interval in seconds (overrides `[broadcast] interval_secs`)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Poll a coalescing cache every second and log value and health until Ctrl-C
    Collect {
        /// Refresh interval in seconds (overrides `[collector] interval_secs`)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let fetcher: SharedFetcher<ClusterInfo> = Arc::new(HttpFetcher::new(config.fetcher_config()?)?);

    info!(version = clustermeta::version::version_string(), "clustermeta starting");

    match args.command {
        Command::Get => get(fetcher, &config).await,
        Command::Watch { interval } => watch(fetcher, &config, interval).await,
        Command::Collect { interval } => collect(fetcher, &config, interval).await,
    }
}

fn load_config(args: &Args) -> Result<Config, clustermeta::MetaError> {
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        // A bare --url is enough to run without any config file.
        Err(e) if args.config.is_none() && args.url.is_some() => {
            debug!(error = %e, "no config file, using defaults");
            Config::default()
        }
        Err(e) => return Err(e),
    };
    if let Some(url) = &args.url {
        config.source.url = Some(url.clone());
    }
    Ok(config)
}

async fn get(
    fetcher: SharedFetcher<ClusterInfo>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = TtlCache::new(fetcher, &config.ttl_cache_config());
    match cache.get().await {
        Ok(info) => {
            println!("{}", cluster_label(Some(&info)));
            debug!(
                version = %info.version.number,
                uuid = %info.cluster_uuid,
                node = %info.name,
                "cluster details"
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", cluster_label(cache.peek().await.as_ref()));
            Err(e.into())
        }
    }
}

async fn watch(
    fetcher: SharedFetcher<ClusterInfo>,
    config: &Config,
    interval: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut broadcast_config = config.broadcast_config();
    if let Some(secs) = interval {
        broadcast_config = broadcast_config.interval(Duration::from_secs(secs));
    }

    let broadcaster = Broadcaster::new(fetcher, &broadcast_config);
    let mut values = broadcaster.subscribe("cli")?;

    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());

    let runner = tokio::spawn({
        let broadcaster = broadcaster.clone();
        let shutdown = shutdown.clone();
        async move { broadcaster.run(shutdown).await }
    });

    // Without a ticker nothing would ever be fetched.
    if broadcast_config.interval.is_zero() {
        broadcaster.update().await?;
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            value = values.next() => match value {
                Some(info) => info!(cluster = cluster_label(Some(&info)), "received metadata"),
                None => break,
            },
        }
    }

    runner.await??;
    if let Some(lagged) = broadcaster.lagged("cli").filter(|n| *n > 0) {
        warn!(lagged, "consumer missed updates");
    }
    Ok(())
}

async fn collect(
    fetcher: SharedFetcher<ClusterInfo>,
    config: &Config,
    interval: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut coalescing_config = config.coalescing_config();
    if let Some(secs) = interval {
        coalescing_config = coalescing_config.interval(Duration::from_secs(secs));
    }

    let cache = CoalescingCache::new(fetcher, &coalescing_config);
    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let collected = cache.collect();
                info!(
                    cluster = cluster_label(collected.value.as_ref()),
                    healthy = collected.healthy,
                    age_secs = collected.age.map(|a| a.as_secs()),
                    error = ?collected.last_error,
                    "collected"
                );
            }
        }
    }
    Ok(())
}

fn spawn_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("shutting down");
        shutdown.cancel();
    });
}
