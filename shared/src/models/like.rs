//! Like relation

use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// (issue, user) pair, unique per pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueLike {
    pub issue_id: RowId,
    pub user_id: String,
}

/// Arguments of the `toggle_like` procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleLikeArgs {
    pub p_issue_id: RowId,
    pub p_user_id: String,
}
