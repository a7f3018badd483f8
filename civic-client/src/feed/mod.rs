//! Issue feed
//!
//! Session-scoped issue list with the user's likes, optimistic like
//! toggling and live reconciliation against the change feed.
//!
//! # Example
//!
//! ```ignore
//! let feed = IssueFeed::new(gateway, session);
//! feed.refresh().await?;
//! let reconciler = feed.spawn_reconciler().await?;
//!
//! let toggle = feed.toggle_like(&issue_id)?; // visible immediately
//! toggle.confirmed().await?;                 // optional
//!
//! reconciler.close().await;
//! ```

pub mod likes;
pub mod reconciler;
pub mod store;
pub mod trending;

pub use likes::{LikeSet, LikeState, LikeToggle};
pub use reconciler::Reconciler;
pub use store::{CommunityStats, FeedState, FilterCriteria, apply_filter};

use chrono::Utc;
use parking_lot::RwLock;
use shared::models::{Issue, IssueLike, ToggleLikeArgs};
use shared::{RowId, Table};
use std::sync::Arc;

use crate::error::ClientResult;
use crate::gateway::{Gateway, Query, fetch};
use crate::types::SessionContext;

/// Feed behaviour knobs
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Undo the optimistic change when the remote toggle fails
    pub rollback_failed_likes: bool,
    /// Trending considers issues created within this window
    pub trending_window: chrono::Duration,
    /// Number of trending issues kept
    pub trending_limit: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            rollback_failed_likes: true,
            trending_window: chrono::Duration::days(7),
            trending_limit: 3,
        }
    }
}

impl FeedOptions {
    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_failed_likes = enabled;
        self
    }

    pub fn with_trending(mut self, window: chrono::Duration, limit: usize) -> Self {
        self.trending_window = window;
        self.trending_limit = limit;
        self
    }
}

/// Issue list query: newest first with like and comment counts
pub fn issues_query() -> Query {
    Query::new(Table::Issues)
        .count(Table::IssueLikes, "issue_id")
        .count(Table::Comments, "issue_id")
        .order_by("created_at", false)
}

/// Feed of one session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct IssueFeed {
    gateway: Arc<dyn Gateway>,
    session: SessionContext,
    options: FeedOptions,
    state: Arc<RwLock<FeedState>>,
}

impl std::fmt::Debug for IssueFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueFeed")
            .field("session", &self.session)
            .field("options", &self.options)
            .field("generation", &self.generation())
            .finish()
    }
}

impl IssueFeed {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionContext) -> Self {
        Self {
            gateway,
            session,
            options: FeedOptions::default(),
            state: Arc::new(RwLock::new(FeedState::default())),
        }
    }

    pub fn with_options(mut self, options: FeedOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn options(&self) -> &FeedOptions {
        &self.options
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    // ========== Loading ==========

    /// Replace the snapshot with a fresh fetch and recompute trending.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn load(&self) -> ClientResult<()> {
        let issues: Vec<Issue> = match fetch(self.gateway.as_ref(), &issues_query()).await {
            Ok(issues) => issues,
            Err(e) => {
                tracing::warn!(error = %e, "Issue fetch failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let trending = trending::trending(
            &issues,
            Utc::now(),
            self.options.trending_window,
            self.options.trending_limit,
        );

        let mut state = self.state.write();
        state.issues = issues;
        state.trending = trending;
        state.generation += 1;
        tracing::debug!(count = state.issues.len(), generation = state.generation, "Feed loaded");
        Ok(())
    }

    /// Fetch the session user's like set; anonymous sessions have none
    pub async fn load_likes(&self) -> ClientResult<()> {
        let Some(user) = self.session.user() else {
            self.state.write().liked = LikeSet::new();
            return Ok(());
        };

        let query = Query::new(Table::IssueLikes)
            .select(&["issue_id", "user_id"])
            .eq("user_id", user.id.as_str());
        let likes: Vec<IssueLike> = match fetch(self.gateway.as_ref(), &query).await {
            Ok(likes) => likes,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user.id, "Like set fetch failed, keeping previous set");
                return Err(e);
            }
        };

        self.state.write().liked = likes.into_iter().map(|l| l.issue_id).collect();
        Ok(())
    }

    /// Reload issues and likes
    pub async fn refresh(&self) -> ClientResult<()> {
        self.load().await?;
        self.load_likes().await
    }

    // ========== Views ==========

    pub fn snapshot(&self) -> Vec<Issue> {
        self.state.read().issues.clone()
    }

    pub fn issue(&self, id: &RowId) -> Option<Issue> {
        self.state.read().issue(id).cloned()
    }

    pub fn filtered(&self, criteria: &FilterCriteria) -> Vec<Issue> {
        apply_filter(&self.state.read().issues, criteria)
    }

    pub fn trending(&self) -> Vec<Issue> {
        self.state.read().trending.clone()
    }

    pub fn is_liked(&self, id: &RowId) -> bool {
        self.state.read().liked.contains(id)
    }

    pub fn liked(&self) -> LikeSet {
        self.state.read().liked.clone()
    }

    pub fn stats(&self) -> CommunityStats {
        CommunityStats::of(&self.state.read().issues)
    }

    /// Number of successful loads so far
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    // ========== Likes ==========

    /// Flip the session user's like on `issue_id`.
    ///
    /// The local change is applied before this returns; the remote
    /// `toggle_like` call runs on a spawned task. Must be called from within a
    /// tokio runtime.
    pub fn toggle_like(&self, issue_id: &RowId) -> ClientResult<LikeToggle> {
        let user = self.session.require_user()?;
        let args = serde_json::to_value(ToggleLikeArgs {
            p_issue_id: issue_id.clone(),
            p_user_id: user.id.clone(),
        })?;

        let (change, generation) = {
            let mut state = self.state.write();
            let change = likes::toggle_local(&mut state, issue_id)?;
            (change, state.generation)
        };

        let feed = self.clone();
        let id = issue_id.clone();
        let confirmation = tokio::spawn(async move {
            match feed.gateway.remote_call("toggle_like", args).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::error!(issue_id = %id, error = %e, "Like toggle failed");
                    if feed.options.rollback_failed_likes {
                        feed.rollback_like(&id, change.liked, generation);
                    }
                    Err(e)
                }
            }
        });

        Ok(LikeToggle {
            issue_id: issue_id.clone(),
            liked: change.liked,
            like_count: change.like_count,
            confirmation,
        })
    }

    /// Undo a failed optimistic toggle if nothing has superseded it.
    ///
    /// A load since the toggle already replaced the count with the server's,
    /// so only the membership is restored then.
    fn rollback_like(&self, issue_id: &RowId, optimistic_liked: bool, generation: u64) {
        let mut state = self.state.write();
        if state.liked.contains(issue_id) != optimistic_liked {
            tracing::debug!(issue_id = %issue_id, "Like state already superseded, no rollback");
            return;
        }

        if state.generation != generation {
            if optimistic_liked {
                state.liked.remove(issue_id);
            } else {
                state.liked.insert(issue_id.clone());
            }
            tracing::info!(issue_id = %issue_id, liked = !optimistic_liked, "Like membership rolled back after reload");
            return;
        }

        match likes::toggle_local(&mut state, issue_id) {
            Ok(restored) => {
                tracing::info!(issue_id = %issue_id, liked = restored.liked, "Optimistic like rolled back")
            }
            Err(e) => tracing::debug!(issue_id = %issue_id, error = %e, "Nothing to roll back"),
        }
    }

    // ========== Reconciliation ==========

    /// Subscribe to likes, comments and issues and reload on every change.
    ///
    /// All three subscriptions are open when this returns. Anonymous
    /// sessions get `AuthRequired` and open nothing.
    pub async fn spawn_reconciler(&self) -> ClientResult<Reconciler> {
        self.session.require_user()?;
        Reconciler::start(self.clone()).await
    }
}
