//! Registered consumers and non-blocking delivery to them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of handing one value to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Buffer full (or send timed out); the value was dropped for this
    /// subscriber only.
    Lagged,
    /// Receiver is gone.
    Closed,
}

impl Delivery {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Delivery::Delivered => "ok",
            Delivery::Lagged => "lagged",
            Delivery::Closed => "closed",
        }
    }
}

/// A named sink registered with a [`Broadcaster`](super::Broadcaster).
///
/// Cloning is cheap and clones share the lag counter, so the publish path can
/// work on a snapshot of the registry without holding its lock.
pub(crate) struct Subscriber<V> {
    name: Arc<str>,
    sink: mpsc::Sender<V>,
    lagged: Arc<AtomicU64>,
}

impl<V> Clone for Subscriber<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sink: self.sink.clone(),
            lagged: self.lagged.clone(),
        }
    }
}

impl<V> Subscriber<V> {
    pub(crate) fn new(name: impl Into<Arc<str>>, sink: mpsc::Sender<V>) -> Self {
        Self {
            name: name.into(),
            sink,
            lagged: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Number of values dropped because this subscriber fell behind.
    pub(crate) fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    /// Hand `value` to the sink without letting a slow reader stall the caller.
    ///
    /// Without a timeout this is a `try_send`; with one, the send may wait
    /// up to `timeout` for buffer space.
    pub(crate) async fn deliver(&self, value: V, timeout: Option<Duration>) -> Delivery {
        let delivery = match timeout {
            None => match self.sink.try_send(value) {
                Ok(()) => Delivery::Delivered,
                Err(TrySendError::Full(_)) => Delivery::Lagged,
                Err(TrySendError::Closed(_)) => Delivery::Closed,
            },
            Some(timeout) => match tokio::time::timeout(timeout, self.sink.send(value)).await {
                Ok(Ok(())) => Delivery::Delivered,
                Ok(Err(_)) => Delivery::Closed,
                Err(_) => Delivery::Lagged,
            },
        };

        if delivery == Delivery::Lagged {
            self.lagged.fetch_add(1, Ordering::Relaxed);
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_into_free_buffer() {
        let (tx, mut rx) = mpsc::channel(1);
        let sub = Subscriber::new("a", tx);
        assert_eq!(sub.deliver(1u32, None).await, Delivery::Delivered);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(sub.lagged(), 0);
    }

    #[tokio::test]
    async fn full_buffer_counts_as_lagged() {
        let (tx, _rx) = mpsc::channel(1);
        let sub = Subscriber::new("a", tx);
        assert_eq!(sub.deliver(1u32, None).await, Delivery::Delivered);
        assert_eq!(sub.deliver(2u32, None).await, Delivery::Lagged);
        assert_eq!(sub.deliver(3u32, None).await, Delivery::Lagged);
        assert_eq!(sub.lagged(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn send_timeout_bounds_the_wait() {
        let (tx, _rx) = mpsc::channel(1);
        let sub = Subscriber::new("a", tx);
        sub.deliver(1u32, None).await;

        let delivery = sub.deliver(2u32, Some(Duration::from_millis(50))).await;
        assert_eq!(delivery, Delivery::Lagged);
        assert_eq!(sub.lagged(), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_is_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sub = Subscriber::new("a", tx);
        assert_eq!(sub.deliver(1u32, None).await, Delivery::Closed);
        assert_eq!(sub.lagged(), 0);
    }

    #[test]
    fn clones_share_lag_counter() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let sub = Subscriber::new("a", tx);
        let clone = sub.clone();
        sub.lagged.fetch_add(3, Ordering::Relaxed);
        assert_eq!(clone.lagged(), 3);
        assert_eq!(clone.name(), "a");
    }
}
