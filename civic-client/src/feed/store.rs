//! Feed state and filtering

use shared::RowId;
use shared::models::{Category, Issue, IssueStatus, Severity};
use std::str::FromStr;

use super::likes::LikeSet;

/// Label selecting every value of a criterion
pub const ALL_LABEL: &str = "all";

/// Feed filter; `None` passes every issue through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub severity: Option<Severity>,
    pub status: Option<IssueStatus>,
    pub category: Option<Category>,
}

impl FilterCriteria {
    /// No filtering
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Build from UI labels, `"all"` meaning no filter on that criterion.
    /// Labels are matched case-sensitively.
    pub fn from_labels(
        severity: &str,
        status: &str,
        category: &str,
    ) -> Result<Self, shared::models::ParseLabelError> {
        Ok(Self {
            severity: criterion(severity)?,
            status: criterion(status)?,
            category: criterion(category)?,
        })
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        self.severity.is_none_or(|s| issue.severity == s)
            && self.status.is_none_or(|s| issue.status == s)
            && self.category.is_none_or(|c| issue.category == c)
    }
}

fn criterion<T: FromStr>(label: &str) -> Result<Option<T>, T::Err> {
    if label == ALL_LABEL {
        Ok(None)
    } else {
        label.parse().map(Some)
    }
}

/// Issues matching `criteria`, in snapshot order
pub fn apply_filter(issues: &[Issue], criteria: &FilterCriteria) -> Vec<Issue> {
    issues.iter().filter(|i| criteria.matches(i)).cloned().collect()
}

/// Community counters shown next to the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommunityStats {
    pub total: usize,
    pub resolved: usize,
}

impl CommunityStats {
    pub fn of(issues: &[Issue]) -> Self {
        Self {
            total: issues.len(),
            resolved: issues.iter().filter(|i| i.status == IssueStatus::Resolved).count(),
        }
    }
}

/// Everything the feed holds for one session
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    /// Last fetched snapshot, newest first
    pub issues: Vec<Issue>,
    /// Issues liked by the session user
    pub liked: LikeSet,
    /// Derived from `issues` on every load
    pub trending: Vec<Issue>,
    /// Incremented on every successful load
    pub generation: u64,
}

impl FeedState {
    pub fn issue(&self, id: &RowId) -> Option<&Issue> {
        self.issues.iter().find(|i| &i.id == id)
    }

    pub fn issue_mut(&mut self, id: &RowId) -> Option<&mut Issue> {
        self.issues.iter_mut().find(|i| &i.id == id)
    }
}
