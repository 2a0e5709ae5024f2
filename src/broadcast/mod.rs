//! Push-model metadata distribution.
//!
//! A [`Broadcaster`] owns a registry of named consumers and a refresh loop.
//! Each refresh fetches once and, on success, pushes the value to every
//! consumer; on failure it logs and publishes nothing, so consumers keep the
//! last value they received.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──trigger──▶ Fetching ──ok──▶ Publishing ──▶ Idle
//!                       └──error──────────────────▶ Idle
//! ```
//!
//! Triggers come from [`Broadcaster::update`] and, when an interval is
//! configured, from a ticker task started by [`Broadcaster::run`]. Triggers
//! that queue up while a refresh is running collapse into a single refresh.
//!
//! # Slow consumers
//!
//! Every consumer has its own bounded buffer. Publishing never waits on a
//! full buffer (or waits at most [`BroadcastConfig::send_timeout`]): the
//! value is dropped for that consumer, its lag counter goes up, and the
//! remaining consumers are served as usual.
//!
//! # Shutdown
//!
//! Cancelling the token passed to [`Broadcaster::run`] stops the ticker and
//! the loop. A refresh already in progress finishes first. Afterwards
//! [`Broadcaster::update`] returns [`MetaError::Stopped`].

mod subscriber;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::subscriber::{Delivery, Subscriber};
use crate::fetch::SharedFetcher;
use crate::{MetaError, Result, telemetry};

/// Default capacity of the trigger queue.
pub const DEFAULT_TRIGGER_BUFFER: usize = 1;

/// Default buffer size for consumers created by [`Broadcaster::subscribe`].
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 4;

/// Configuration for [`Broadcaster`].
///
/// ```rust
/// # use clustermeta::BroadcastConfig;
/// # use std::time::Duration;
/// let config = BroadcastConfig::new()
///     .interval(Duration::from_secs(300))
///     .send_timeout(Some(Duration::from_millis(100)));
/// assert_eq!(config.trigger_buffer, 1);
/// ```
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Name used in logs and metric labels. Default: `"cluster_info"`.
    pub name: String,
    /// Periodic refresh interval; zero disables the ticker. Default: 5 minutes.
    pub interval: Duration,
    /// Capacity of the trigger queue. Default: 1.
    pub trigger_buffer: usize,
    /// Buffer size for [`Broadcaster::subscribe`] channels. Default: 4.
    pub subscriber_buffer: usize,
    /// How long a publish may wait on a full consumer buffer. `None` never
    /// waits. Default: `None`.
    pub send_timeout: Option<Duration>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            name: "cluster_info".to_string(),
            interval: Duration::from_secs(5 * 60),
            trigger_buffer: DEFAULT_TRIGGER_BUFFER,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            send_timeout: None,
        }
    }
}

impl BroadcastConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the periodic refresh interval (zero disables the ticker).
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the trigger queue capacity (at least 1).
    pub fn trigger_buffer(mut self, n: usize) -> Self {
        self.trigger_buffer = n.max(1);
        self
    }

    /// Set the buffer size of channels created by [`Broadcaster::subscribe`] (at least 1).
    pub fn subscriber_buffer(mut self, n: usize) -> Self {
        self.subscriber_buffer = n.max(1);
        self
    }

    /// Set how long a publish may wait on a full consumer buffer.
    pub fn send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }
}

/// Where the refresh loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterState {
    Idle,
    Fetching,
    Publishing,
}

impl BroadcasterState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BroadcasterState::Fetching,
            2 => BroadcasterState::Publishing,
            _ => BroadcasterState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            BroadcasterState::Idle => 0,
            BroadcasterState::Fetching => 1,
            BroadcasterState::Publishing => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Manual,
    Tick,
}

struct Inner<V> {
    name: String,
    interval: Duration,
    subscriber_buffer: usize,
    send_timeout: Option<Duration>,
    fetcher: SharedFetcher<V>,
    // Guarded separately from fetch state so registration never waits on a refresh.
    subscribers: RwLock<Vec<Subscriber<V>>>,
    trigger_tx: mpsc::Sender<Trigger>,
    trigger_rx: Mutex<Option<mpsc::Receiver<Trigger>>>,
    // Token of the running loop; set once by `run`.
    shutdown: Mutex<Option<CancellationToken>>,
    state: AtomicU8,
    ticker_running: AtomicBool,
    last_value: RwLock<Option<V>>,
}

/// Fetches metadata on demand or on a timer and pushes it to named consumers.
///
/// Cheap to clone; clones share the registry and the loop.
pub struct Broadcaster<V>(Arc<Inner<V>>);

impl<V> Clone for Broadcaster<V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<V> Broadcaster<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a broadcaster. Nothing is fetched until [`run`](Self::run).
    pub fn new(fetcher: SharedFetcher<V>, config: &BroadcastConfig) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(config.trigger_buffer.max(1));
        Self(Arc::new(Inner {
            name: config.name.clone(),
            interval: config.interval,
            subscriber_buffer: config.subscriber_buffer.max(1),
            send_timeout: config.send_timeout,
            fetcher,
            subscribers: RwLock::new(Vec::new()),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            shutdown: Mutex::new(None),
            state: AtomicU8::new(BroadcasterState::Idle.as_u8()),
            ticker_running: AtomicBool::new(false),
            last_value: RwLock::new(None),
        }))
    }

    /// Register `sink` under `name`.
    ///
    /// Names are unique: a second registration under the same name fails
    /// with [`MetaError::AlreadyRegistered`] and leaves the registry as is.
    /// Safe to call before or while [`run`](Self::run) is active.
    pub fn register_consumer(&self, name: impl Into<String>, sink: mpsc::Sender<V>) -> Result<()> {
        let name = name.into();
        let mut subscribers = self
            .0
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.iter().any(|s| s.name() == name) {
            return Err(MetaError::AlreadyRegistered(name));
        }
        debug!(broadcaster = %self.0.name, consumer = %name, "registered consumer");
        subscribers.push(Subscriber::new(name, sink));
        Ok(())
    }

    /// Register a new consumer and return its receiving end as a stream.
    ///
    /// The channel holds [`BroadcastConfig::subscriber_buffer`] values.
    pub fn subscribe(&self, name: impl Into<String>) -> Result<ReceiverStream<V>> {
        let (tx, rx) = mpsc::channel(self.0.subscriber_buffer);
        self.register_consumer(name, tx)?;
        Ok(ReceiverStream::new(rx))
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.subscribers_snapshot().len()
    }

    /// Registered consumer names, in registration order.
    pub fn consumer_names(&self) -> Vec<String> {
        self.subscribers_snapshot()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// How many values `name` has missed because its buffer was full.
    pub fn lagged(&self, name: &str) -> Option<u64> {
        self.subscribers_snapshot()
            .iter()
            .find(|s| s.name() == name)
            .map(Subscriber::lagged)
    }

    /// Most recently published value.
    pub fn last_value(&self) -> Option<V> {
        self.0
            .last_value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current loop state.
    pub fn state(&self) -> BroadcasterState {
        BroadcasterState::from_u8(self.0.state.load(Ordering::Acquire))
    }

    /// Whether the periodic ticker is running.
    pub fn is_ticker_running(&self) -> bool {
        self.0.ticker_running.load(Ordering::Acquire)
    }

    /// Request a refresh.
    ///
    /// Returns as soon as the trigger is queued; waits only if the trigger
    /// queue is full. Fails with [`MetaError::Stopped`] as soon as the token
    /// given to [`run`](Self::run) is cancelled, even before the loop has
    /// wound down, and also when cancellation arrives while waiting on a
    /// full queue.
    pub async fn update(&self) -> Result<()> {
        let shutdown = self
            .0
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(shutdown) = shutdown else {
            // Not running yet: queue for the first loop iteration.
            return self
                .0
                .trigger_tx
                .send(Trigger::Manual)
                .await
                .map_err(|_| MetaError::Stopped);
        };

        if shutdown.is_cancelled() {
            return Err(MetaError::Stopped);
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(MetaError::Stopped),
            sent = self.0.trigger_tx.send(Trigger::Manual) => sent.map_err(|_| MetaError::Stopped),
        }
    }

    /// Run the refresh loop until `shutdown` is cancelled.
    ///
    /// Starts the ticker when an interval is configured; its first tick fires
    /// immediately. Only one loop may run per broadcaster: a second call
    /// returns [`MetaError::AlreadyRunning`].
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut triggers = self
            .0
            .trigger_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(MetaError::AlreadyRunning)?;
        *self
            .0
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(shutdown.clone());

        let ticker_token = shutdown.child_token();
        let ticker = if self.0.interval.is_zero() {
            None
        } else {
            let inner = self.0.clone();
            let token = ticker_token.clone();
            Some(tokio::spawn(async move { inner.run_ticker(token).await }))
        };

        info!(
            broadcaster = %self.0.name,
            interval_secs = self.0.interval.as_secs(),
            consumers = self.consumer_count(),
            "refresh loop started"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            let mut coalesced = 0usize;
            while triggers.try_recv().is_ok() {
                coalesced += 1;
            }
            debug!(broadcaster = %self.0.name, ?trigger, coalesced, "refresh triggered");

            self.0.refresh_and_publish().await;
        }

        // Refuse further triggers before anything else observes the shutdown.
        triggers.close();
        ticker_token.cancel();
        if let Some(ticker) = ticker {
            let _ = ticker.await;
        }

        info!(broadcaster = %self.0.name, "refresh loop stopped");
        Ok(())
    }

    fn subscribers_snapshot(&self) -> Vec<Subscriber<V>> {
        self.0
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn set_state(&self, state: BroadcasterState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    async fn run_ticker(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker_running.store(true, Ordering::Release);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // A full queue already holds a pending refresh.
                    match self.trigger_tx.try_send(Trigger::Tick) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
            }
        }

        self.ticker_running.store(false, Ordering::Release);
        debug!(broadcaster = %self.name, "ticker stopped");
    }

    async fn refresh_and_publish(&self) {
        self.set_state(BroadcasterState::Fetching);
        let start = Instant::now();
        let result = self.fetcher.fetch().await;
        telemetry::record_fetch(&self.name, start.elapsed().as_secs_f64(), result.is_ok());

        match result {
            Ok(value) => {
                self.set_state(BroadcasterState::Publishing);
                *self
                    .last_value
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
                self.publish(value).await;
            }
            Err(e) => {
                warn!(
                    broadcaster = %self.name,
                    kind = e.kind(),
                    error = %e,
                    "metadata fetch failed, consumers keep their last value"
                );
            }
        }
        self.set_state(BroadcasterState::Idle);
    }

    async fn publish(&self, value: V) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for subscriber in &subscribers {
            let delivery = subscriber.deliver(value.clone(), self.send_timeout).await;
            metrics::counter!(telemetry::PUBLISH_TOTAL,
                "subscriber" => subscriber.name().to_owned(),
                "status" => delivery.as_str(),
            )
            .increment(1);

            match delivery {
                Delivery::Delivered => {}
                Delivery::Lagged => {
                    metrics::counter!(telemetry::SUBSCRIBER_LAGGED_TOTAL,
                        "subscriber" => subscriber.name().to_owned(),
                    )
                    .increment(1);
                    warn!(
                        broadcaster = %self.name,
                        consumer = subscriber.name(),
                        lagged = subscriber.lagged(),
                        "consumer fell behind, value dropped"
                    );
                }
                Delivery::Closed => {
                    debug!(broadcaster = %self.name, consumer = subscriber.name(), "consumer receiver dropped");
                }
            }
        }
        debug!(broadcaster = %self.name, consumers = subscribers.len(), "published");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::fetch::MetadataFetcher;

    /// Returns a fresh `Arc` per call so tests can check object identity.
    struct MockFetcher {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl MockFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetadataFetcher for MockFetcher {
        type Value = Arc<String>;

        async fn fetch(&self) -> Result<Arc<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                return Err(MetaError::Transport("connection refused".into()));
            }
            Ok(Arc::new(format!("v{n}")))
        }
    }

    fn manual_only() -> BroadcastConfig {
        BroadcastConfig::new().interval(Duration::ZERO)
    }

    fn start(broadcaster: &Broadcaster<Arc<String>>) -> CancellationToken {
        let token = CancellationToken::new();
        let b = broadcaster.clone();
        let t = token.clone();
        tokio::spawn(async move { b.run(t).await });
        token
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let broadcaster = Broadcaster::new(MockFetcher::new(), &manual_only());
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        broadcaster.register_consumer("x", tx1).unwrap();
        let err = broadcaster.register_consumer("x", tx2).unwrap_err();

        assert_eq!(err, MetaError::AlreadyRegistered("x".into()));
        assert_eq!(broadcaster.consumer_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_fans_out_same_object() {
        let broadcaster = Broadcaster::new(MockFetcher::new(), &manual_only());
        let (tx_a, mut rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(1);
        broadcaster.register_consumer("a", tx_a).unwrap();
        broadcaster.register_consumer("b", tx_b).unwrap();

        let token = start(&broadcaster);
        broadcaster.update().await.unwrap();

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.as_str(), "v1");
        assert_eq!(broadcaster.last_value().as_deref().map(String::as_str), Some("v1"));
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_publishes_nothing() {
        let fetcher = MockFetcher::new();
        fetcher.failing.store(true, Ordering::SeqCst);
        let broadcaster = Broadcaster::new(fetcher.clone(), &manual_only());
        let (tx, mut rx) = mpsc::channel(1);
        broadcaster.register_consumer("a", tx).unwrap();

        let token = start(&broadcaster);
        broadcaster.update().await.unwrap();
        settle().await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert!(broadcaster.last_value().is_none());
        assert_eq!(broadcaster.state(), BroadcasterState::Idle);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_does_not_block_others() {
        let broadcaster = Broadcaster::new(MockFetcher::new(), &manual_only());
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(1);
        broadcaster.register_consumer("slow", slow_tx).unwrap();
        broadcaster.register_consumer("fast", fast_tx).unwrap();

        let token = start(&broadcaster);
        for expected in ["v1", "v2", "v3"] {
            broadcaster.update().await.unwrap();
            let value = fast_rx.recv().await.unwrap();
            assert_eq!(value.as_str(), expected);
        }

        assert_eq!(broadcaster.lagged("slow"), Some(2));
        assert_eq!(broadcaster.lagged("fast"), Some(0));
        assert_eq!(broadcaster.lagged("missing"), None);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn queued_triggers_collapse_into_one_fetch() {
        let fetcher = MockFetcher::new();
        let broadcaster = Broadcaster::new(fetcher.clone(), &manual_only().trigger_buffer(4));
        let (tx, mut rx) = mpsc::channel(4);
        broadcaster.register_consumer("a", tx).unwrap();

        for _ in 0..4 {
            broadcaster.update().await.unwrap();
        }
        let token = start(&broadcaster);
        settle().await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(rx.recv().await.unwrap().as_str(), "v1");
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_refreshes_periodically() {
        let fetcher = MockFetcher::new();
        let config = BroadcastConfig::new().interval(Duration::from_secs(10));
        let broadcaster = Broadcaster::new(fetcher.clone(), &config);
        let (tx, mut rx) = mpsc::channel(16);
        broadcaster.register_consumer("a", tx).unwrap();

        let token = start(&broadcaster);
        // Ticks at 0s, 10s and 20s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(broadcaster.is_ticker_running());
        assert_eq!(fetcher.calls(), 3);

        for expected in ["v1", "v2", "v3"] {
            assert_eq!(rx.recv().await.unwrap().as_str(), expected);
        }

        token.cancel();
        settle().await;
        assert!(!broadcaster.is_ticker_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_loop_and_refuses_triggers() {
        let broadcaster = Broadcaster::new(MockFetcher::new(), &manual_only());
        let token = CancellationToken::new();
        let b = broadcaster.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { b.run(t).await });

        settle().await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(broadcaster.update().await, Err(MetaError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_rejected() {
        let broadcaster = Broadcaster::new(MockFetcher::new(), &manual_only());
        let token = start(&broadcaster);
        settle().await;

        let result = broadcaster.run(CancellationToken::new()).await;
        assert_eq!(result, Err(MetaError::AlreadyRunning));
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn registration_while_running() {
        let broadcaster = Broadcaster::new(MockFetcher::new(), &manual_only());
        let token = start(&broadcaster);
        settle().await;

        let mut stream = broadcaster.subscribe("late").unwrap();
        broadcaster.update().await.unwrap();

        assert_eq!(stream.next().await.unwrap().as_str(), "v1");
        assert_eq!(broadcaster.consumer_names(), vec!["late".to_string()]);
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn update_refused_as_soon_as_token_is_cancelled() {
        let fetcher = MockFetcher::new();
        let broadcaster = Broadcaster::new(fetcher.clone(), &manual_only());
        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let b = broadcaster.clone();
            let t = token.clone();
            async move { b.run(t).await }
        });
        settle().await;

        // The loop has not had a chance to notice the cancellation yet.
        token.cancel();
        assert_eq!(broadcaster.update().await, Err(MetaError::Stopped));
        assert_eq!(broadcaster.update().await, Err(MetaError::Stopped));

        handle.await.unwrap().unwrap();
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_update_blocked_on_full_queue() {
        let broadcaster = Broadcaster::new(GatedFetcher::new(), &manual_only());
        let token = start(&broadcaster);
        settle().await;

        // One trigger is being fetched (parked), one fills the queue.
        broadcaster.update().await.unwrap();
        settle().await;
        broadcaster.update().await.unwrap();

        let blocked = tokio::spawn({
            let b = broadcaster.clone();
            async move { b.update().await }
        });
        settle().await;
        assert!(!blocked.is_finished());

        token.cancel();
        assert_eq!(blocked.await.unwrap(), Err(MetaError::Stopped));
    }

    /// Parks every fetch until `release` is called.
    struct GatedFetcher {
        gate: tokio::sync::Notify,
    }

    impl GatedFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: tokio::sync::Notify::new(),
            })
        }

        fn release(&self) {
            self.gate.notify_one();
        }
    }

    #[async_trait]
    impl MetadataFetcher for GatedFetcher {
        type Value = Arc<String>;

        async fn fetch(&self) -> Result<Arc<String>> {
            self.gate.notified().await;
            Ok(Arc::new("gated".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn registration_during_fetch_does_not_wait() {
        let fetcher = GatedFetcher::new();
        let broadcaster = Broadcaster::new(fetcher.clone(), &manual_only());
        let token = start(&broadcaster);
        broadcaster.update().await.unwrap();

        for _ in 0..100 {
            if broadcaster.state() == BroadcasterState::Fetching {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(broadcaster.state(), BroadcasterState::Fetching);

        // Completes while the fetch is still parked.
        let (tx, mut rx) = mpsc::channel(1);
        broadcaster.register_consumer("mid_fetch", tx).unwrap();
        assert_eq!(broadcaster.consumer_count(), 1);
        assert_eq!(broadcaster.state(), BroadcasterState::Fetching);

        fetcher.release();
        assert_eq!(rx.recv().await.unwrap().as_str(), "gated");
        settle().await;
        assert_eq!(broadcaster.state(), BroadcasterState::Idle);
        token.cancel();
    }
}
