//! Change feed subscriptions
//!
//! A [`Subscription`] is a stream of [`ChangeEvent`]s for one table, fed by a
//! background task. Gateways differ only in how that task obtains events
//! (websocket channel or in-process bus); teardown is always the same:
//! cancel the task and wait for it.

mod client;
mod watcher;

pub use client::RealtimeClient;
pub use watcher::Watcher;

use futures::Stream;
use shared::{ChangeEvent, EventMask, Table};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Change feed configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Heartbeat interval on the websocket channel
    pub heartbeat_interval: Duration,
    /// Websocket connect timeout
    pub connect_timeout: Duration,
    /// Events buffered per subscription before the feed task waits
    pub channel_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            channel_buffer: 256,
        }
    }
}

impl RealtimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-subscription buffer (at least 1)
    pub fn with_channel_buffer(mut self, buffer: usize) -> Self {
        self.channel_buffer = buffer.max(1);
        self
    }
}

/// Live change feed for one table.
///
/// Yields events until the feed ends or [`close`](Subscription::close) is
/// called. Dropping the subscription cancels the feed task without waiting.
#[derive(Debug)]
pub struct Subscription {
    table: Table,
    mask: EventMask,
    rx: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Start a feed task and return the subscription reading from it.
    ///
    /// `feed` receives the sending half and a cancellation token; it must
    /// return once the token is cancelled.
    pub fn spawn<F, Fut>(table: Table, mask: EventMask, buffer: usize, feed: F) -> Self
    where
        F: FnOnce(mpsc::Sender<ChangeEvent>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(feed(tx, cancel.clone()));

        Self {
            table,
            mask,
            rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    /// Next event, `None` once the feed has ended
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Release the feed and wait for its task to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(table = %self.table, "Change feed task ended abnormally: {}", e);
            }
        }
        tracing::debug!(table = %self.table, "Subscription closed");
    }
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use shared::ChangeKind;

    #[test]
    fn config_builder() {
        let config = RealtimeConfig::new()
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_channel_buffer(0);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.channel_buffer, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn yields_events_then_closes_the_task() {
        let mut sub = Subscription::spawn(Table::Comments, EventMask::ALL, 4, |tx, cancel| async move {
            let event = ChangeEvent::new(Table::Comments, ChangeKind::Insert, serde_json::json!({"id": 1}));
            let _ = tx.send(event).await;
            cancel.cancelled().await;
        });

        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(sub.table(), Table::Comments);

        tokio::time::timeout(Duration::from_secs(1), sub.close())
            .await
            .expect("close must not hang");
    }

    #[tokio::test]
    async fn ends_when_the_feed_task_returns() {
        let mut sub = Subscription::spawn(Table::Issues, EventMask::INSERT, 1, |_tx, _cancel| async {});
        assert!(sub.next_event().await.is_none());
    }
}
