//! The durable job record model.
//!
//! A [`Job`] is one execution of a fetch or upload orchestration. Records are
//! created in [`JobStatus::Running`] at enqueue time, are mutated only by the
//! worker task executing that job, and end in exactly one terminal status.
//! Status transitions are monotonic: once a record is observed in a terminal
//! status no later read will ever return a different one.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) mod runner;

/// An opaque job identifier, stable for the lifetime of the job.
#[derive(Debug, Eq, PartialEq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct JobId(i32);

impl From<i32> for JobId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<JobId> for i32 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// The two orchestrations a worker can run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Pull new videos from a set of source creators into the pending pool.
    Fetch,
    /// Publish an explicit list of pending videos to a destination account.
    Upload,
}

impl Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Fetch => write!(f, "fetch"),
            JobKind::Upload => write!(f, "upload"),
        }
    }
}

/// The job state machine: `Running` followed by exactly one terminal status.
///
/// There is no queued state visible to callers: jobs start executing as soon
/// as a worker slot is free. Cancellation is a normal terminal outcome, not a
/// failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal. Terminal statuses never change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A durable job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Destination account, present for upload jobs only.
    pub account: Option<String>,
    /// Human readable summary of where the job is or how it ended.
    pub message: String,
    /// The job's input, persisted for operator inspection across restarts.
    pub payload: serde_json::Value,
    /// Fixed once the job begins processing.
    pub total_items: u32,
    /// Never exceeds `total_items`.
    pub current_item: u32,
    /// Free-text descriptor of the item currently being processed.
    pub current_item_label: Option<String>,
    /// When the next publish is scheduled, set while the job cools down.
    pub next_action_at: Option<DateTime<Utc>>,
    /// Remaining cooldown at the last durable checkpoint.
    pub cooldown_seconds: Option<u64>,
    pub inserted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Completion as a percentage, clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        percent(self.current_item, self.total_items)
    }

    /// Remaining cooldown derived from `next_action_at`, for pollers that
    /// only see the durable record.
    pub fn remaining_cooldown(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.status.is_terminal() {
            return None;
        }
        let next = self.next_action_at?;
        let seconds = (next - now).num_seconds();
        if seconds > 0 {
            Some(seconds as u64)
        } else {
            None
        }
    }
}

pub(crate) fn percent(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    (u64::from(current) * 100 / u64::from(total)).min(100) as u8
}
