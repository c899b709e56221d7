//! The job record store: durable persistence for [`Job`] records.
//!
//! The store is an injected repository rather than a process-wide singleton so
//! the orchestration core can be exercised without a real database. Real
//! deployments implement [`JobStore`] against their database; the in-memory
//! implementation in [`memory`] is the correct reference implementation and is
//! what the test suite runs against.
//!
//! Durability is best-effort from the perspective of a running job: the worker
//! never treats a failed store write as fatal. That policy lives in the
//! callers (see [`crate::job::runner`]), which log and drop write errors.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    job::{Job, JobId, JobKind, JobStatus},
    pruner::PruneSpec,
};

pub mod memory;

/// Persistence contract for job records.
///
/// Implementations must enforce monotonic status transitions: an update that
/// would move a record out of a terminal status is dropped, not applied, so
/// pollers can never observe a status regression.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Allocates a new job identity in state [`JobStatus::Running`].
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError>;

    /// Applies a partial update to the record's mutable fields.
    async fn update(&self, id: JobId, update: JobUpdate) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Lists records newest first, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Operator-driven removal of a single record.
    async fn delete(&self, id: JobId) -> Result<(), StoreError>;

    /// Removes records matching the spec, returning the removed ids so the
    /// caller can evict the matching progress snapshots.
    async fn prune(&self, spec: &PruneSpec) -> Result<Vec<JobId>, StoreError>;
}

/// The fields required to create a job record.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub account: Option<String>,
    pub message: String,
    pub payload: serde_json::Value,
    pub total_items: u32,
}

/// A partial update to a job record. Unset fields are left untouched.
///
/// The double-`Option` fields distinguish "leave as is" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub current_item: Option<u32>,
    pub current_item_label: Option<Option<String>>,
    pub next_action_at: Option<Option<DateTime<Utc>>>,
    pub cooldown_seconds: Option<Option<u64>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(current_item: u32, message: impl Into<String>) -> Self {
        Self {
            current_item: Some(current_item),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    pub fn with_current_item_label(self, label: impl Into<String>) -> Self {
        Self {
            current_item_label: Some(Some(label.into())),
            ..self
        }
    }

    /// Records an upcoming cooldown window on the durable record.
    pub fn with_cooldown(self, next_action_at: DateTime<Utc>, seconds: u64) -> Self {
        Self {
            next_action_at: Some(Some(next_action_at)),
            cooldown_seconds: Some(Some(seconds)),
            ..self
        }
    }

    /// Clears any recorded cooldown window.
    pub fn clear_cooldown(self) -> Self {
        Self {
            next_action_at: Some(None),
            cooldown_seconds: Some(None),
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No job found with id {0}")]
    NotFound(JobId),
    /// A catalog row (video, source, account) is missing.
    #[error("No row found for key {0}")]
    RowNotFound(String),
    /// The backing store is unreachable. Running jobs treat this as a logged,
    /// non-fatal condition.
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
    #[error("Job store in bad state")]
    BadState,
}
