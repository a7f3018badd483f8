//! Client error types

use shared::Table;
use thiserror::Error;

/// Client error type
///
/// The first four variants are the failure taxonomy every flow reports in:
/// reads (`Fetch`), mutations (`Write`), unauthenticated actions
/// (`AuthRequired`) and remote procedure / classifier calls (`Call`).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Read failed; callers keep their previous snapshot
    #[error("Fetch from {table} failed: {message}")]
    Fetch { table: Table, message: String },

    /// Mutation failed
    #[error("Write to {table} failed: {message}")]
    Write { table: Table, message: String },

    /// Action attempted without an authenticated session
    #[error("Authentication required")]
    AuthRequired,

    /// Remote procedure or classifier call failed
    #[error("Call to {name} failed: {message}")]
    Call { name: String, message: String },

    /// Input rejected before any remote call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Change feed could not be opened or broke down
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error outside of a specific gateway operation
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn fetch(table: Table, message: impl ToString) -> Self {
        Self::Fetch {
            table,
            message: message.to_string(),
        }
    }

    pub fn write(table: Table, message: impl ToString) -> Self {
        Self::Write {
            table,
            message: message.to_string(),
        }
    }

    pub fn call(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Call {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failure left local state untouched and can simply be
    /// retried by the user
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Write { .. } | Self::Call { .. } | Self::Http(_)
        )
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
