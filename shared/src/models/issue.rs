//! Issue Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ParseLabelError, null_as_default};
use crate::types::{GeoPoint, RowId};

// ============================================================================
// Category
// ============================================================================

/// Issue category assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Accident,
    Fire,
    Traffic,
    Roads,
    Water,
    Nature,
    Electricity,
    Sanitation,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Accident,
        Category::Fire,
        Category::Traffic,
        Category::Roads,
        Category::Water,
        Category::Nature,
        Category::Electricity,
        Category::Sanitation,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Accident => "accident",
            Category::Fire => "fire",
            Category::Traffic => "traffic",
            Category::Roads => "roads",
            Category::Water => "water",
            Category::Nature => "nature",
            Category::Electricity => "electricity",
            Category::Sanitation => "sanitation",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseLabelError::new("category", s))
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Issue severity assigned by the classifier
///
/// Labels outside the known set decode as `Minor` so one odd row cannot
/// break a whole read. `FromStr` stays strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emergency,
    /// Older rows carry `high` for this level
    #[serde(alias = "high")]
    Critical,
    Urgent,
    #[serde(rename = "needs attention")]
    NeedsAttention,
    /// Classifier fallback when no label is returned
    #[default]
    #[serde(other)]
    Minor,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Emergency,
        Severity::Critical,
        Severity::Urgent,
        Severity::NeedsAttention,
        Severity::Minor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "emergency",
            Severity::Critical => "critical",
            Severity::Urgent => "urgent",
            Severity::NeedsAttention => "needs attention",
            Severity::Minor => "minor",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive: `"Emergency"` is not a severity
impl FromStr for Severity {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "high" {
            return Ok(Severity::Critical);
        }
        Severity::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseLabelError::new("severity", s))
    }
}

// ============================================================================
// Status
// ============================================================================

/// Triage status, mutated by officials
///
/// Unrecognized labels decode as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IssueStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Rejected,
    #[default]
    #[serde(other)]
    Pending,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 4] = [
        IssueStatus::Pending,
        IssueStatus::InProgress,
        IssueStatus::Resolved,
        IssueStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "Pending",
            IssueStatus::InProgress => "In Progress",
            IssueStatus::Resolved => "Resolved",
            IssueStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueStatus::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseLabelError::new("status", s))
    }
}

// ============================================================================
// Issue
// ============================================================================

/// Citizen-reported issue as read from the feed
///
/// `like_count` and `comment_count` are aggregates maintained by the gateway.
/// On the wire they arrive as embedded count aggregates
/// (`"issue_likes": [{"count": 4}]`) or as plain integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: RowId,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: Category,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
    /// Free text, `"lat,lng"` when pinned on the map
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub department_id: Option<RowId>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_full_name: Option<String>,
    #[serde(default)]
    pub user_avatar_url: Option<String>,
    #[serde(
        default,
        rename(deserialize = "issue_likes"),
        alias = "like_count",
        deserialize_with = "count_aggregate"
    )]
    pub like_count: u64,
    #[serde(
        default,
        rename(deserialize = "comments"),
        alias = "comment_count",
        deserialize_with = "count_aggregate"
    )]
    pub comment_count: u64,
}

impl Issue {
    /// Pinned coordinates, if the location column holds a `"lat,lng"` pair
    pub fn coordinates(&self) -> Option<GeoPoint> {
        self.location.as_deref().and_then(|l| l.parse().ok())
    }

    /// Author name shown in the feed
    pub fn author_name(&self) -> &str {
        self.user_full_name.as_deref().unwrap_or("Anonymous")
    }
}

/// Insert payload for a new report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub status: IssueStatus,
    pub category: Category,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<RowId>,
    pub user_id: String,
    pub user_full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Status change written by officials
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IssueStatusPatch {
    pub status: IssueStatus,
}

/// Row returned by the nearby-issue lookup procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyIssue {
    pub id: RowId,
    pub title: String,
    #[serde(default)]
    pub distance_m: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountField {
    Plain(u64),
    Aggregate(Vec<CountRow>),
}

#[derive(Deserialize)]
struct CountRow {
    count: u64,
}

fn count_aggregate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Option::<CountField>::deserialize(deserializer)? {
        Some(CountField::Plain(n)) => n,
        Some(CountField::Aggregate(rows)) => rows.first().map(|r| r.count).unwrap_or(0),
        None => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_embedded_count_aggregates() {
        let issue: Issue = serde_json::from_value(json!({
            "id": 7,
            "title": "Pothole",
            "description": "Large pothole on Main Street",
            "category": "roads",
            "severity": "needs attention",
            "status": "In Progress",
            "created_at": "2026-10-10T08:00:00Z",
            "location": "19.45,72.8",
            "issue_likes": [{ "count": 4 }],
            "comments": []
        }))
        .unwrap();

        assert_eq!(issue.id, RowId::from(7));
        assert_eq!(issue.severity, Severity::NeedsAttention);
        assert_eq!(issue.status, IssueStatus::InProgress);
        assert_eq!(issue.like_count, 4);
        assert_eq!(issue.comment_count, 0);
        assert_eq!(issue.coordinates(), Some(GeoPoint::new(19.45, 72.8)));
        assert_eq!(issue.author_name(), "Anonymous");
    }

    #[test]
    fn tolerates_nulls_and_unknown_labels() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "a1",
            "title": "Something odd",
            "description": null,
            "category": "volcano",
            "severity": null,
            "created_at": "2026-10-10T08:00:00Z"
        }))
        .unwrap();

        assert_eq!(issue.description, "");
        assert_eq!(issue.category, Category::Unknown);
        assert_eq!(issue.severity, Severity::Minor);
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.like_count, 0);
    }

    #[test]
    fn unknown_severity_and_status_fall_back() {
        let issue: Issue = serde_json::from_value(json!({
            "id": 9,
            "title": "Legacy row",
            "severity": "low",
            "status": "Closed",
            "created_at": "2026-10-10T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(issue.severity, Severity::Minor);
        assert_eq!(issue.status, IssueStatus::Pending);

        let issue: Issue = serde_json::from_value(json!({
            "id": 10,
            "title": "Old label",
            "severity": "high",
            "created_at": "2026-10-10T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(issue.severity, Severity::Critical);

        assert!("low".parse::<Severity>().is_err());
        assert!("Closed".parse::<IssueStatus>().is_err());
    }

    #[test]
    fn serialized_issue_reads_back() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "a1",
            "title": "Fire",
            "created_at": "2026-10-10T08:00:00Z",
            "issue_likes": 3,
            "comments": [{ "count": 2 }]
        }))
        .unwrap();
        let back: Issue = serde_json::from_value(serde_json::to_value(&issue).unwrap()).unwrap();
        assert_eq!(back, issue);
    }

    #[test]
    fn label_parsing_is_case_sensitive() {
        assert_eq!("emergency".parse::<Severity>().unwrap(), Severity::Emergency);
        assert!("Emergency".parse::<Severity>().is_err());
        assert_eq!("In Progress".parse::<IssueStatus>().unwrap(), IssueStatus::InProgress);
        assert!("pending".parse::<IssueStatus>().is_err());
        assert_eq!("sanitation".parse::<Category>().unwrap(), Category::Sanitation);
    }
}
