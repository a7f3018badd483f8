//! Like set and the optimistic toggle transition

use shared::RowId;
use std::collections::HashSet;
use tokio::task::JoinHandle;

use super::store::FeedState;
use crate::error::{ClientError, ClientResult};

/// Issues liked by the session user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeSet(HashSet<RowId>);

impl LikeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, issue_id: &RowId) -> bool {
        self.0.contains(issue_id)
    }

    pub fn insert(&mut self, issue_id: RowId) -> bool {
        self.0.insert(issue_id)
    }

    pub fn remove(&mut self, issue_id: &RowId) -> bool {
        self.0.remove(issue_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowId> {
        self.0.iter()
    }
}

impl FromIterator<RowId> for LikeSet {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Local like state of one issue after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: u64,
}

/// Invert the like on `issue_id`.
///
/// Membership and the cached count always change together; the count never
/// drops below zero. Fails without touching state when the issue is not in
/// the snapshot.
pub fn toggle_local(state: &mut FeedState, issue_id: &RowId) -> ClientResult<LikeState> {
    let was_liked = state.liked.contains(issue_id);
    let issue = state
        .issue_mut(issue_id)
        .ok_or_else(|| ClientError::NotFound(format!("issue {issue_id}")))?;

    issue.like_count = if was_liked {
        issue.like_count.saturating_sub(1)
    } else {
        issue.like_count + 1
    };
    let like_count = issue.like_count;

    if was_liked {
        state.liked.remove(issue_id);
    } else {
        state.liked.insert(issue_id.clone());
    }

    Ok(LikeState {
        liked: !was_liked,
        like_count,
    })
}

/// Result of [`IssueFeed::toggle_like`](super::IssueFeed::toggle_like)
///
/// Carries the optimistic state already visible in the feed. The remote
/// toggle runs in the background; dropping this value does not cancel it.
#[derive(Debug)]
pub struct LikeToggle {
    pub issue_id: RowId,
    pub liked: bool,
    pub like_count: u64,
    pub(crate) confirmation: JoinHandle<ClientResult<()>>,
}

impl LikeToggle {
    /// Wait for the gateway's answer
    pub async fn confirmed(self) -> ClientResult<()> {
        self.confirmation
            .await
            .map_err(|e| ClientError::call("toggle_like", e))?
    }
}
