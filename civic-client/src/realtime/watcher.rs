//! Single-subscription watcher
//!
//! Runs a handler for every event of one subscription and publishes the
//! handler's latest value on a watch channel.

use futures::StreamExt;
use shared::ChangeEvent;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Subscription;
use crate::gateway::Gateway;

/// Live value derived from a change feed
#[derive(Debug)]
pub struct Watcher<T> {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    updates: watch::Receiver<T>,
}

impl<T> Watcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Drive `subscription` until cancelled or the feed ends.
    ///
    /// `on_event` returning `None` leaves the published value unchanged.
    pub fn spawn<F, Fut>(gateway: Arc<dyn Gateway>, mut subscription: Subscription, initial: T, mut on_event: F) -> Self
    where
        F: FnMut(ChangeEvent) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send,
    {
        let (tx, updates) = watch::channel(initial);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let table = subscription.table();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = subscription.next() => match event {
                        Some(event) => {
                            if let Some(value) = on_event(event).await {
                                tx.send_replace(value);
                            }
                        }
                        None => {
                            tracing::debug!(table = %table, "Watched change feed ended");
                            break;
                        }
                    }
                }
            }
            gateway.unsubscribe(subscription).await;
        });

        Self {
            cancel,
            task: Some(task),
            updates,
        }
    }

    /// Receiver of every published value
    pub fn updates(&self) -> watch::Receiver<T> {
        self.updates.clone()
    }

    /// Most recently published value
    pub fn latest(&self) -> T {
        self.updates.borrow().clone()
    }

    /// Stop watching and release the subscription
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Watcher task ended abnormally: {}", e);
            }
        }
    }
}

impl<T> Drop for Watcher<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::json;
    use shared::{ChangeKind, EventMask, Table};
    use std::time::Duration;

    #[tokio::test]
    async fn publishes_handler_values() {
        let gateway = MemoryGateway::new();
        let subscription = gateway.subscribe(Table::Notifications, EventMask::INSERT).await.unwrap();

        let watcher = Watcher::spawn(Arc::new(gateway.clone()), subscription, 0usize, {
            let mut seen = 0;
            move |_event| {
                seen += 1;
                async move { Some(seen) }
            }
        });
        let mut updates = watcher.updates();

        gateway.publish(ChangeEvent::new(Table::Notifications, ChangeKind::Insert, json!({ "id": 1 })));
        gateway.publish(ChangeEvent::new(Table::Notifications, ChangeKind::Insert, json!({ "id": 2 })));

        tokio::time::timeout(Duration::from_secs(1), updates.wait_for(|n| *n == 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(watcher.latest(), 2);

        watcher.close().await;
        assert_eq!(gateway.subscriber_count(), 0);
    }
}
