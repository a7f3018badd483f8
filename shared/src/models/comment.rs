//! Comment Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// Append-only comment on an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: RowId,
    pub issue_id: RowId,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_full_name: Option<String>,
    #[serde(default)]
    pub user_avatar_url: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn author_name(&self) -> &str {
        self.user_full_name.as_deref().unwrap_or("Anonymous")
    }
}

/// Insert payload for a new comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub issue_id: RowId,
    pub user_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_avatar_url: Option<String>,
}
