//! Data models
//!
//! Row types read from and written to the gateway tables.
//! All ids are opaque [`RowId`](crate::types::RowId)s.

pub mod comment;
pub mod department;
pub mod issue;
pub mod like;
pub mod notification;

// Re-exports
pub use comment::*;
pub use department::*;
pub use issue::*;
pub use like::*;
pub use notification::*;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Unrecognized enumeration label
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseLabelError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Treat an explicit `null` like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
