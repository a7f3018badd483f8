//! Civic Client - issue feed client for the civic reporting platform
//!
//! Talks to the managed data platform through a [`Gateway`] and keeps a
//! session's issue feed in sync: initial fetch, optimistic likes and
//! change-feed reconciliation. Report submission, issue threads,
//! notifications, profile edits and the official console build on the same
//! gateway.

pub mod achievements;
pub mod admin;
pub mod classifier;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod logger;
pub mod notifications;
pub mod profile;
pub mod realtime;
pub mod report;
pub mod routing;
pub mod thread;
pub mod types;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use types::SessionContext;

pub use classifier::{Classification, Classifier, FixedClassifier, HttpClassifier};
pub use feed::{FeedOptions, FilterCriteria, IssueFeed, LikeToggle, Reconciler};
pub use gateway::{Gateway, MemoryGateway, Query, RestGateway};
pub use profile::ProfileEditor;
pub use realtime::{RealtimeClient, RealtimeConfig, Subscription, Watcher};

// Re-export shared types for convenience
pub use shared::models::{Category, Comment, Department, Issue, IssueStatus, Notification, Severity};
pub use shared::{ChangeEvent, ChangeKind, EventMask, GeoPoint, RowId, Table, UserInfo};
