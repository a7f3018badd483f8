//! Reporter achievements

use shared::Table;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::ClientResult;
use crate::gateway::{Gateway, Query};
use crate::types::SessionContext;

/// Badge earned at a number of submitted reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Achievement {
    pub milestone: u64,
    pub name: &'static str,
}

pub const ACHIEVEMENTS: [Achievement; 4] = [
    Achievement { milestone: 1, name: "First Responder" },
    Achievement { milestone: 5, name: "Community Hero" },
    Achievement { milestone: 10, name: "Top Reporter" },
    Achievement { milestone: 20, name: "Legend of Service" },
];

/// Achievements held with `total` reports
pub fn earned(total: u64) -> Vec<Achievement> {
    ACHIEVEMENTS.into_iter().filter(|a| total >= a.milestone).collect()
}

/// Announces each achievement once
#[derive(Clone)]
pub struct AchievementTracker {
    gateway: Arc<dyn Gateway>,
    session: SessionContext,
    shown: BTreeSet<u64>,
}

impl AchievementTracker {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionContext) -> Self {
        Self {
            gateway,
            session,
            shown: BTreeSet::new(),
        }
    }

    /// Milestones already announced in an earlier session
    pub fn with_shown(mut self, milestones: impl IntoIterator<Item = u64>) -> Self {
        self.shown.extend(milestones);
        self
    }

    /// Milestones announced so far, for persisting
    pub fn shown(&self) -> impl Iterator<Item = u64> + '_ {
        self.shown.iter().copied()
    }

    /// Reports submitted by the session user
    pub async fn report_count(&self) -> ClientResult<u64> {
        let user = self.session.require_user()?;
        let query = Query::new(Table::Issues).eq("user_id", user.id.as_str());
        self.gateway.count(&query).await
    }

    /// Fetch the report count and return achievements reached but not yet shown
    pub async fn check(&mut self) -> ClientResult<Vec<Achievement>> {
        let total = self.report_count().await?;
        let unlocked = self.unlock(total);
        for achievement in &unlocked {
            tracing::info!(milestone = achievement.milestone, name = achievement.name, "Achievement unlocked");
        }
        Ok(unlocked)
    }

    fn unlock(&mut self, total: u64) -> Vec<Achievement> {
        earned(total)
            .into_iter()
            .filter(|a| self.shown.insert(a.milestone))
            .collect()
    }
}
