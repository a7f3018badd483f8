//! Issue detail thread
//!
//! One issue with its comments, oldest first. New comments from any client
//! are appended as they arrive on the change feed.

use parking_lot::RwLock;
use shared::models::{Comment, Issue, NewComment};
use shared::{ChangeEvent, EventMask, RowId, Table};
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::gateway::{Gateway, Query, create, fetch};
use crate::realtime::Watcher;
use crate::types::SessionContext;

#[derive(Debug, Default)]
struct ThreadState {
    issue: Option<Issue>,
    comments: Vec<Comment>,
}

impl ThreadState {
    /// Append unless already present; returns the new comment count
    fn append(&mut self, comment: Comment) -> usize {
        if !self.comments.iter().any(|c| c.id == comment.id) {
            self.comments.push(comment);
        }
        self.comments.len()
    }
}

/// Detail view of one issue
#[derive(Clone)]
pub struct IssueThread {
    gateway: Arc<dyn Gateway>,
    session: SessionContext,
    issue_id: RowId,
    state: Arc<RwLock<ThreadState>>,
}

impl IssueThread {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionContext, issue_id: RowId) -> Self {
        Self {
            gateway,
            session,
            issue_id,
            state: Arc::new(RwLock::new(ThreadState::default())),
        }
    }

    pub fn issue_id(&self) -> &RowId {
        &self.issue_id
    }

    /// Fetch the issue and its comments
    pub async fn load(&self) -> ClientResult<()> {
        let query = Query::new(Table::Issues)
            .count(Table::IssueLikes, "issue_id")
            .count(Table::Comments, "issue_id")
            .eq("id", self.issue_id.as_str())
            .limit(1);
        let issue: Issue = fetch(self.gateway.as_ref(), &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("issue {}", self.issue_id)))?;

        let query = Query::new(Table::Comments)
            .eq("issue_id", self.issue_id.as_str())
            .order_by("created_at", true);
        let comments: Vec<Comment> = fetch(self.gateway.as_ref(), &query).await?;

        let mut state = self.state.write();
        state.issue = Some(issue);
        state.comments = comments;
        Ok(())
    }

    pub fn issue(&self) -> Option<Issue> {
        self.state.read().issue.clone()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.state.read().comments.clone()
    }

    /// Post a comment as the session user.
    ///
    /// Blank content is ignored (`Ok(None)`). The thread itself picks the
    /// comment up from the change feed.
    pub async fn post_comment(&self, content: &str) -> ClientResult<Option<Comment>> {
        let user = self.session.require_user()?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let row = NewComment {
            issue_id: self.issue_id.clone(),
            user_id: user.id.clone(),
            content: content.to_string(),
            user_full_name: user.user_metadata.full_name.clone(),
            user_avatar_url: user.user_metadata.avatar_url.clone(),
        };
        let comment: Comment = create(self.gateway.as_ref(), Table::Comments, &row).await?;
        tracing::debug!(issue_id = %self.issue_id, comment_id = %comment.id, "Comment posted");
        Ok(Some(comment))
    }

    /// Follow new comments on this issue; publishes the comment count
    pub async fn watch(&self) -> ClientResult<Watcher<usize>> {
        let subscription = self.gateway.subscribe(Table::Comments, EventMask::INSERT).await?;
        let initial = self.state.read().comments.len();
        let thread = self.clone();

        Ok(Watcher::spawn(self.gateway.clone(), subscription, initial, move |event| {
            let appended = thread.on_comment(&event);
            async move { appended }
        }))
    }

    fn on_comment(&self, event: &ChangeEvent) -> Option<usize> {
        let comment: Comment = match event.record_as() {
            Ok(comment) => comment,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable comment on change feed");
                return None;
            }
        };
        if comment.issue_id != self.issue_id {
            return None;
        }
        Some(self.state.write().append(comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn comment(id: &str, issue_id: &str) -> Comment {
        serde_json::from_value(json!({
            "id": id,
            "issue_id": issue_id,
            "content": "me too",
            "created_at": Utc::now()
        }))
        .unwrap()
    }

    #[test]
    fn append_skips_duplicates() {
        let mut state = ThreadState::default();
        assert_eq!(state.append(comment("c1", "1")), 1);
        assert_eq!(state.append(comment("c1", "1")), 1);
        assert_eq!(state.append(comment("c2", "1")), 2);
    }
}
