//! Shared types for the civic issue client
//!
//! Row models, identifiers and change-feed messages used by every crate in
//! the workspace.

pub mod client;
pub mod message;
pub mod models;
pub mod types;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use client::UserInfo;
pub use message::{ChangeEvent, ChangeKind, EventMask, Table};
pub use types::{GeoPoint, RowId};
