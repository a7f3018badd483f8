//! Remote data gateway
//!
//! The managed platform is consumed only through [`Gateway`]: row queries,
//! inserts, updates, remote procedure calls, object upload, profile metadata
//! and change feed subscriptions. Rows travel as JSON; [`fetch`] and [`create`] decode them
//! into `shared` models.

pub mod memory;
pub mod rest;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::client::UserMetadata;
use shared::{EventMask, RowId, Table, UserInfo};

use crate::error::{ClientError, ClientResult};
use crate::realtime::Subscription;

// ============================================================================
// Query
// ============================================================================

/// Row filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column > value`
    Gt(String, Value),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::Gt(column, _) => column,
        }
    }
}

/// Sort order on one column
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Count aggregate of a related table embedded in each row.
///
/// Rendered as `issue_likes(count)` and returned as `[{ "count": n }]`
/// under the related table's name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddedCount {
    pub table: Table,
    /// Column on the related table pointing back at the row's `id`
    pub foreign_key: &'static str,
}

/// Read request against one table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    /// Selected columns, empty for all
    pub columns: Vec<String>,
    pub counts: Vec<EmbeddedCount>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            counts: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Restrict the selected columns
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Embed the row count of `table` where `foreign_key` = this row's id
    pub fn count(mut self, table: Table, foreign_key: &'static str) -> Self {
        self.counts.push(EmbeddedCount { table, foreign_key });
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Select clause, e.g. `*,issue_likes(count),comments(count)`
    pub fn select_clause(&self) -> String {
        let mut parts = if self.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.columns.clone()
        };
        parts.extend(self.counts.iter().map(|c| format!("{}(count)", c.table)));
        parts.join(",")
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Capability surface of the managed data platform
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Read rows; failures are [`ClientError::Fetch`]
    async fn query(&self, query: &Query) -> ClientResult<Vec<Value>>;

    /// Number of rows matching `query`
    async fn count(&self, query: &Query) -> ClientResult<u64> {
        Ok(self.query(query).await?.len() as u64)
    }

    /// Insert a row and return it as stored; failures are [`ClientError::Write`]
    async fn insert(&self, table: Table, row: Value) -> ClientResult<Value>;

    /// Patch the row with `id`; failures are [`ClientError::Write`]
    async fn update(&self, table: Table, id: &RowId, patch: Value) -> ClientResult<()>;

    /// Call a database-side procedure; failures are [`ClientError::Call`]
    async fn remote_call(&self, name: &str, args: Value) -> ClientResult<Value>;

    /// Store an object, replacing any object at `path`, and return its
    /// public URL
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> ClientResult<String>;

    /// Replace the profile metadata of user `user_id` and return the user as
    /// stored; failures are [`ClientError::Write`] on [`Table::Users`]
    async fn update_user(&self, user_id: &str, metadata: &UserMetadata) -> ClientResult<UserInfo>;

    /// Open a change feed on `table` for the kinds in `mask`
    async fn subscribe(&self, table: Table, mask: EventMask) -> ClientResult<Subscription>;

    /// Release a change feed
    async fn unsubscribe(&self, subscription: Subscription) {
        subscription.close().await;
    }
}

/// Query and decode rows.
///
/// Rows that do not decode make the whole read a [`ClientError::Fetch`].
pub async fn fetch<T: DeserializeOwned>(gateway: &dyn Gateway, query: &Query) -> ClientResult<Vec<T>> {
    let table = query.table;
    gateway
        .query(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| ClientError::fetch(table, e)))
        .collect()
}

/// Insert a typed row and decode the stored row.
pub async fn create<T, R>(gateway: &dyn Gateway, table: Table, row: &T) -> ClientResult<R>
where
    T: Serialize + Sync,
    R: DeserializeOwned,
{
    let value = serde_json::to_value(row)?;
    let stored = gateway.insert(table, value).await?;
    serde_json::from_value(stored).map_err(|e| ClientError::write(table, e))
}
