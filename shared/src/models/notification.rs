//! Notification Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// Notification addressed to a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: RowId,
    pub user_id: String,
    #[serde(default)]
    pub issue_id: Option<RowId>,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Server-tracked read cursor, one row per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    pub user_id: String,
    pub last_seen_at: DateTime<Utc>,
}
