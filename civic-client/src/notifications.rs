//! Notification inbox
//!
//! Freshness is tracked by a per-user read cursor stored server-side in
//! `notification_reads`, so every device of the user sees the same state.

use chrono::{DateTime, Utc};
use serde_json::json;
use shared::models::{Notification, NotificationRead};
use shared::{EventMask, Table};
use std::sync::Arc;

use crate::error::ClientResult;
use crate::gateway::{Gateway, Query, create, fetch};
use crate::realtime::Watcher;
use crate::types::SessionContext;

/// Notifications as listed when the inbox is opened
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    /// Newest first
    pub notifications: Vec<Notification>,
    /// Cursor before this opening; `None` when never opened
    pub previously_seen: Option<DateTime<Utc>>,
}

impl Inbox {
    /// Whether `notification` arrived after the previous opening
    pub fn is_new(&self, notification: &Notification) -> bool {
        self.previously_seen.is_none_or(|seen| notification.created_at > seen)
    }

    pub fn unseen(&self) -> usize {
        self.notifications.iter().filter(|n| self.is_new(n)).count()
    }
}

/// Notifications of the session user
#[derive(Clone)]
pub struct NotificationCenter {
    gateway: Arc<dyn Gateway>,
    session: SessionContext,
}

impl NotificationCenter {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionContext) -> Self {
        Self { gateway, session }
    }

    /// Open the inbox: list notifications newest first and advance the cursor
    pub async fn open(&self) -> ClientResult<Inbox> {
        let user = self.session.require_user()?;
        let query = Query::new(Table::Notifications)
            .eq("user_id", user.id.as_str())
            .order_by("created_at", false);
        let notifications: Vec<Notification> = fetch(self.gateway.as_ref(), &query).await?;

        let cursor = self.read_cursor().await?;
        let previously_seen = cursor.as_ref().map(|c| c.last_seen_at);
        self.write_cursor(cursor, Utc::now()).await?;

        Ok(Inbox {
            notifications,
            previously_seen,
        })
    }

    /// The user's read cursor, if any
    pub async fn read_cursor(&self) -> ClientResult<Option<NotificationRead>> {
        let user = self.session.require_user()?;
        let query = Query::new(Table::NotificationReads)
            .eq("user_id", user.id.as_str())
            .limit(1);
        Ok(fetch(self.gateway.as_ref(), &query).await?.into_iter().next())
    }

    /// Move the read cursor to `at`
    pub async fn mark_seen(&self, at: DateTime<Utc>) -> ClientResult<()> {
        let cursor = self.read_cursor().await?;
        self.write_cursor(cursor, at).await
    }

    /// Update `existing`, or create the user's first cursor
    async fn write_cursor(&self, existing: Option<NotificationRead>, at: DateTime<Utc>) -> ClientResult<()> {
        let user = self.session.require_user()?;
        match existing {
            Some(NotificationRead { id: Some(id), .. }) => {
                self.gateway
                    .update(Table::NotificationReads, &id, json!({ "last_seen_at": at }))
                    .await?;
            }
            _ => {
                let cursor = NotificationRead {
                    id: None,
                    user_id: user.id.clone(),
                    last_seen_at: at,
                };
                let _: NotificationRead = create(self.gateway.as_ref(), Table::NotificationReads, &cursor).await?;
            }
        }
        tracing::debug!(user_id = %user.id, seen_at = %at, "Notification cursor advanced");
        Ok(())
    }

    /// Whether the newest notification is past the read cursor.
    ///
    /// Anonymous sessions never have news.
    pub async fn has_new(&self) -> ClientResult<bool> {
        let Some(user) = self.session.user() else {
            return Ok(false);
        };

        let query = Query::new(Table::Notifications)
            .select(&["id", "user_id", "created_at"])
            .eq("user_id", user.id.as_str())
            .order_by("created_at", false)
            .limit(1);
        let Some(latest) = fetch::<Notification>(self.gateway.as_ref(), &query).await?.into_iter().next() else {
            return Ok(false);
        };

        Ok(match self.read_cursor().await? {
            Some(cursor) => latest.created_at > cursor.last_seen_at,
            None => true,
        })
    }

    /// Live "has new" flag, recomputed on every notification change
    pub async fn watch(&self) -> ClientResult<Watcher<bool>> {
        let subscription = self.gateway.subscribe(Table::Notifications, EventMask::ALL).await?;
        let initial = self.has_new().await?;
        let center = self.clone();

        Ok(Watcher::spawn(self.gateway.clone(), subscription, initial, move |_event| {
            let center = center.clone();
            async move {
                match center.has_new().await {
                    Ok(fresh) => Some(fresh),
                    Err(e) => {
                        tracing::warn!(error = %e, "Notification check failed");
                        None
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::RowId;

    fn notification(minutes_ago: i64) -> Notification {
        Notification {
            id: RowId::from(minutes_ago),
            user_id: "u1".into(),
            issue_id: None,
            message: "Status changed".into(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn inbox_marks_items_after_cursor() {
        let inbox = Inbox {
            notifications: vec![notification(1), notification(30)],
            previously_seen: Some(Utc::now() - Duration::minutes(10)),
        };
        assert!(inbox.is_new(&inbox.notifications[0]));
        assert!(!inbox.is_new(&inbox.notifications[1]));
        assert_eq!(inbox.unseen(), 1);

        let first_visit = Inbox {
            previously_seen: None,
            ..inbox
        };
        assert_eq!(first_visit.unseen(), 2);
    }

    #[tokio::test]
    async fn open_reads_the_cursor_once() {
        use crate::gateway::MemoryGateway;
        use shared::UserInfo;

        let gateway = MemoryGateway::new();
        let session = SessionContext::authenticated(UserInfo::new("u1"), "jwt");
        let center = NotificationCenter::new(Arc::new(gateway.clone()), session);

        let first = center.open().await.unwrap();
        assert!(first.previously_seen.is_none());
        assert_eq!(gateway.query_count(Table::NotificationReads), 1);
        assert_eq!(gateway.rows(Table::NotificationReads).len(), 1);

        let second = center.open().await.unwrap();
        assert!(second.previously_seen.is_some());
        assert_eq!(gateway.query_count(Table::NotificationReads), 2);
        assert_eq!(gateway.rows(Table::NotificationReads).len(), 1);
    }
}
