//! Change feed reconciler
//!
//! One task per session. Every change on the likes, comments or issues
//! relation triggers a full reload of the feed; changes on the likes
//! relation also reload the session user's like set. No payload diffing.

use futures::stream::{self, select_all};
use futures::{StreamExt, future};
use shared::{ChangeEvent, EventMask, Table};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::IssueFeed;
use crate::error::ClientResult;
use crate::realtime::Subscription;

/// Relations whose changes invalidate the feed
pub const WATCHED_TABLES: [Table; 3] = [Table::IssueLikes, Table::Comments, Table::Issues];

/// Running reconciliation task.
///
/// [`close`](Reconciler::close) releases every subscription and waits for
/// the task; dropping only cancels it.
#[derive(Debug)]
pub struct Reconciler {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    generation: watch::Receiver<u64>,
}

impl Reconciler {
    pub(crate) async fn start(feed: IssueFeed) -> ClientResult<Self> {
        let gateway = feed.gateway().clone();

        let mut subscriptions = Vec::with_capacity(WATCHED_TABLES.len());
        for table in WATCHED_TABLES {
            match gateway.subscribe(table, EventMask::ALL).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Reconciler subscription failed");
                    for subscription in subscriptions {
                        gateway.unsubscribe(subscription).await;
                    }
                    return Err(e);
                }
            }
        }

        let (tx, rx) = watch::channel(feed.generation());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(feed, subscriptions, tx, cancel.clone()));

        tracing::info!("Feed reconciler started");
        Ok(Self {
            cancel,
            task: Some(task),
            generation: rx,
        })
    }

    /// Feed generation after each handled change
    pub fn generation(&self) -> watch::Receiver<u64> {
        self.generation.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop reconciling and release the subscriptions
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Reconciler task ended abnormally: {}", e);
            }
        }
        tracing::info!("Feed reconciler stopped");
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    feed: IssueFeed,
    mut subscriptions: Vec<Subscription>,
    generation: watch::Sender<u64>,
    cancel: CancellationToken,
) {
    {
        // each feed yields Err(table) once when it ends
        let mut changes = select_all(subscriptions.iter_mut().map(|subscription| {
            let table = subscription.table();
            subscription.map(Ok).chain(stream::once(future::ready(Err(table))))
        }));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                change = changes.next() => match change {
                    Some(Ok(event)) => {
                        reconcile(&feed, &event).await;
                        generation.send_replace(feed.generation());
                    }
                    Some(Err(table)) => {
                        tracing::warn!(table = %table, "Change feed ended, reconciler stopping");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let gateway = feed.gateway().clone();
    for subscription in subscriptions {
        gateway.unsubscribe(subscription).await;
    }
}

/// Full reload for one change; failures are logged by the feed and the
/// previous snapshot stays
async fn reconcile(feed: &IssueFeed, event: &ChangeEvent) {
    tracing::debug!(table = %event.table, kind = %event.kind, "Change received, reloading feed");

    let result = if event.table == Table::IssueLikes {
        feed.refresh().await
    } else {
        feed.load().await
    };

    if let Err(e) = result {
        tracing::debug!(table = %event.table, error = %e, "Reload after change failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, MemoryGateway, Query};
    use crate::types::SessionContext;
    use serde_json::{Value, json};
    use shared::client::UserMetadata;
    use shared::{RowId, UserInfo};
    use std::sync::Arc;
    use std::time::Duration;

    fn citizen() -> SessionContext {
        SessionContext::authenticated(UserInfo::new("u1"), "jwt")
    }

    /// Memory gateway that refuses one table's subscription and serves a
    /// feed that ends at once for another
    struct Flaky {
        inner: MemoryGateway,
        refused: Option<Table>,
        ended: Option<Table>,
    }

    #[async_trait::async_trait]
    impl Gateway for Flaky {
        async fn query(&self, q: &Query) -> ClientResult<Vec<Value>> {
            self.inner.query(q).await
        }
        async fn insert(&self, t: Table, r: Value) -> ClientResult<Value> {
            self.inner.insert(t, r).await
        }
        async fn update(&self, t: Table, id: &RowId, p: Value) -> ClientResult<()> {
            self.inner.update(t, id, p).await
        }
        async fn remote_call(&self, n: &str, a: Value) -> ClientResult<Value> {
            self.inner.remote_call(n, a).await
        }
        async fn upload(&self, b: &str, p: &str, bytes: Vec<u8>) -> ClientResult<String> {
            self.inner.upload(b, p, bytes).await
        }
        async fn update_user(&self, id: &str, m: &UserMetadata) -> ClientResult<UserInfo> {
            self.inner.update_user(id, m).await
        }
        async fn subscribe(&self, table: Table, mask: EventMask) -> ClientResult<Subscription> {
            if self.refused == Some(table) {
                return Err(crate::error::ClientError::Subscription("refused".into()));
            }
            if self.ended == Some(table) {
                return Ok(Subscription::spawn(table, mask, 1, |_tx, _cancel| async {}));
            }
            self.inner.subscribe(table, mask).await
        }
    }

    #[tokio::test]
    async fn reloads_on_change_and_releases_subscriptions() {
        let gateway = MemoryGateway::new();
        gateway.seed(
            Table::Issues,
            [json!({ "id": 1, "title": "Leak", "created_at": "2026-10-10T08:00:00Z" })],
        );
        let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen());
        feed.load().await.unwrap();

        let reconciler = feed.spawn_reconciler().await.unwrap();
        assert_eq!(gateway.subscriber_count(), WATCHED_TABLES.len());
        assert!(reconciler.is_running());

        let mut generation = reconciler.generation();
        gateway
            .insert(Table::Comments, json!({ "issue_id": 1, "content": "Still leaking" }))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), generation.wait_for(|g| *g >= 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feed.issue(&RowId::from(1)).unwrap().comment_count, 1);

        reconciler.close().await;
        assert_eq!(gateway.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn failed_subscribe_releases_the_opened_ones() {
        let memory = MemoryGateway::new();
        let gateway = Flaky { inner: memory.clone(), refused: Some(Table::Issues), ended: None };
        let feed = IssueFeed::new(Arc::new(gateway), citizen());
        assert!(feed.spawn_reconciler().await.is_err());
        assert_eq!(memory.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn ended_feed_stops_the_reconciler() {
        let memory = MemoryGateway::new();
        let gateway = Flaky { inner: memory.clone(), refused: None, ended: Some(Table::Comments) };
        let feed = IssueFeed::new(Arc::new(gateway), citizen());

        let reconciler = feed.spawn_reconciler().await.unwrap();
        let mut generation = reconciler.generation();

        let stopped = tokio::time::timeout(Duration::from_secs(2), generation.changed())
            .await
            .unwrap();
        assert!(stopped.is_err());

        reconciler.close().await;
        assert_eq!(memory.subscriber_count(), 0);
    }
}
