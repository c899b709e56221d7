//! Row stores for the content catalog: videos, sources, and destination
//! accounts.
//!
//! These tables are owned by the persistence layer outside this crate; jobs
//! only touch them through these narrow contracts. Single-row updates must be
//! atomic at the storage layer (insert-if-absent, transactional status
//! update), never application-level read-modify-write.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub mod memory;

/// Lifecycle of a content item. Transitions are one-directional except for
/// operator-driven deletion.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Pending,
    Downloaded,
    Uploaded,
    Failed,
}

impl VideoStatus {
    pub(crate) fn rank(&self) -> u8 {
        match self {
            VideoStatus::Pending => 0,
            VideoStatus::Downloaded => 1,
            VideoStatus::Uploaded => 2,
            VideoStatus::Failed => 2,
        }
    }
}

/// A content item, identified by its source URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub url: String,
    pub theme: String,
    pub status: VideoStatus,
    pub inserted_at: DateTime<Utc>,
}

/// The content item table.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Inserts the URL as a pending item unless it is already known.
    ///
    /// Returns `true` when a new row was created. Must be atomic so that a
    /// re-fetched URL never produces a duplicate row.
    async fn insert_pending(&self, url: &str, theme: &str) -> Result<bool, StoreError>;

    /// Transactionally updates a single item's status.
    async fn set_status(&self, url: &str, status: VideoStatus) -> Result<(), StoreError>;

    async fn get(&self, url: &str) -> Result<Option<Video>, StoreError>;

    async fn list_by_theme(
        &self,
        theme: &str,
        status: Option<VideoStatus>,
    ) -> Result<Vec<Video>, StoreError>;
}

/// The source creator table. Jobs only bump fetch statistics here.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Bumps the source's last-fetch timestamp and fetched-count.
    async fn record_fetch(&self, source: &str, fetched: u32) -> Result<(), StoreError>;
}

/// Eligibility of a destination account.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Blocked,
    Error,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Blocked => write!(f, "blocked"),
            AccountStatus::Error => write!(f, "error"),
        }
    }
}

/// A destination account. Credentials live with the platform layer; the core
/// only needs identity, theme affinity, and eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub theme: String,
    pub status: AccountStatus,
    pub posts_count: u32,
    pub last_post_at: Option<DateTime<Utc>>,
}

/// The destination account table. Jobs read eligibility at start and bump the
/// post counter after each successful publish.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Bumps the account's post counter and last-post timestamp.
    async fn record_post(&self, username: &str) -> Result<(), StoreError>;
}
