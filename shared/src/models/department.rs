//! Department Model

use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// Municipal department issues are routed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: RowId,
    pub name: String,
}

impl Department {
    /// Department names are stored with stray whitespace in places
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.trim() == name.trim()
    }
}
