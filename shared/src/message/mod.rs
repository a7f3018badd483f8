//! Change feed message types
//!
//! Row-level change notifications pushed by the gateway. Shared by every
//! gateway implementation (realtime websocket and in-process bus) so that
//! consumers never see transport details.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::models::ParseLabelError;

// ============================================================================
// Tables
// ============================================================================

/// Gateway tables read or written by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Issues,
    IssueLikes,
    Comments,
    Notifications,
    NotificationReads,
    Departments,
    /// Auth users; only their profile metadata is written
    Users,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Issues,
        Table::IssueLikes,
        Table::Comments,
        Table::Notifications,
        Table::NotificationReads,
        Table::Departments,
        Table::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Issues => "issues",
            Table::IssueLikes => "issue_likes",
            Table::Comments => "comments",
            Table::Notifications => "notifications",
            Table::NotificationReads => "notification_reads",
            Table::Departments => "departments",
            Table::Users => "users",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseLabelError::new("table", s))
    }
}

// ============================================================================
// Change kinds and masks
// ============================================================================

/// Row-level mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    fn bit(self) -> u8 {
        match self {
            ChangeKind::Insert => 0b001,
            ChangeKind::Update => 0b010,
            ChangeKind::Delete => 0b100,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            _ => Err(ParseLabelError::new("change kind", s)),
        }
    }
}

impl From<ChangeKind> for EventMask {
    fn from(kind: ChangeKind) -> Self {
        EventMask(kind.bit())
    }
}

/// Set of change kinds a subscription is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask(u8);

impl EventMask {
    pub const INSERT: EventMask = EventMask(0b001);
    pub const UPDATE: EventMask = EventMask(0b010);
    pub const DELETE: EventMask = EventMask(0b100);
    pub const ALL: EventMask = EventMask(0b111);

    pub fn contains(&self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Event filter understood by the realtime server.
    ///
    /// The server only accepts a single kind or `*`; mixed masks subscribe to
    /// `*` and are narrowed client-side.
    pub fn as_filter(&self) -> &'static str {
        match *self {
            EventMask::INSERT => "INSERT",
            EventMask::UPDATE => "UPDATE",
            EventMask::DELETE => "DELETE",
            _ => "*",
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        EventMask::ALL
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventMask(self.0 | rhs.0)
    }
}

// ============================================================================
// Change event
// ============================================================================

/// One row-level change on one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// New row image (`null` for deletes)
    #[serde(default)]
    pub record: serde_json::Value,
    /// Previous row image, when the server sends one
    #[serde(default)]
    pub old_record: serde_json::Value,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, record: serde_json::Value) -> Self {
        Self {
            table,
            kind,
            record,
            old_record: serde_json::Value::Null,
            commit_timestamp: Some(Utc::now()),
        }
    }

    pub fn with_old_record(mut self, old_record: serde_json::Value) -> Self {
        self.old_record = old_record;
        self
    }

    /// Field of the new row image, falling back to the old one (deletes)
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.record
            .get(name)
            .or_else(|| self.old_record.get(name))
            .filter(|v| !v.is_null())
    }

    /// Decode the new row image
    pub fn record_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mask_membership() {
        let mask = EventMask::INSERT | EventMask::DELETE;
        assert!(mask.contains(ChangeKind::Insert));
        assert!(!mask.contains(ChangeKind::Update));
        assert!(mask.contains(ChangeKind::Delete));
        assert_eq!(mask.as_filter(), "*");
        assert_eq!(EventMask::UPDATE.as_filter(), "UPDATE");
        assert_eq!(EventMask::default(), EventMask::ALL);
    }

    #[test]
    fn field_falls_back_to_old_record() {
        let event = ChangeEvent::new(Table::IssueLikes, ChangeKind::Delete, serde_json::Value::Null)
            .with_old_record(json!({ "issue_id": "9", "user_id": "u1" }));
        assert_eq!(event.field("issue_id"), Some(&json!("9")));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
        assert!("profiles".parse::<Table>().is_err());
    }
}
