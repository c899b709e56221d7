//! The live progress channel.
//!
//! A best-effort, in-memory mirror of each running job's progress, written at
//! a much higher frequency than the durable record (every cooldown tick) and
//! read by any number of dashboard pollers. The single job body task is the
//! only writer for a given id, so last-write-wins overwrite is all that is
//! required; readers tolerate staleness.
//!
//! Snapshots for terminal jobs are deliberately not evicted at the moment of
//! the terminal transition, so a poller always gets at least one look at the
//! final status. Eviction happens later, via the retention sweep.
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::job::{self, Job, JobId, JobStatus};

/// A shared, cheaply clonable keyed map of the latest progress per job.
#[derive(Clone, Default)]
pub struct ProgressChannel {
    inner: Arc<RwLock<FxHashMap<JobId, ProgressSnapshot>>>,
}

/// The latest, possibly stale, view of a job's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub current_item: u32,
    pub total_items: u32,
    pub percent: u8,
    pub current_item_label: Option<String>,
    pub message: String,
    pub remaining_cooldown_seconds: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// One progress write from a job body.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub current_item: u32,
    pub total_items: u32,
    pub current_item_label: Option<String>,
    pub message: String,
    pub remaining_cooldown_seconds: Option<u64>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the latest snapshot for a running job. Last write wins.
    pub fn set(&self, job_id: JobId, update: ProgressUpdate) {
        self.write(job_id, JobStatus::Running, update);
    }

    /// Patches the snapshot with a terminal status, inserting one if the job
    /// never reported progress. The entry stays readable until pruned.
    pub fn finish(&self, job_id: JobId, status: JobStatus, message: impl Into<String>) {
        let Ok(mut map) = self.inner.write() else {
            tracing::warn!(%job_id, "Progress channel lock poisoned, dropping final snapshot");
            return;
        };
        let message = message.into();
        match map.get_mut(&job_id) {
            Some(snapshot) => {
                snapshot.status = status;
                snapshot.message = message;
                snapshot.remaining_cooldown_seconds = None;
                snapshot.updated_at = Utc::now();
            }
            None => {
                map.insert(
                    job_id,
                    ProgressSnapshot {
                        job_id,
                        status,
                        current_item: 0,
                        total_items: 0,
                        percent: 0,
                        current_item_label: None,
                        message,
                        remaining_cooldown_seconds: None,
                        updated_at: Utc::now(),
                    },
                );
            }
        }
    }

    /// The latest snapshot for the job, if one is live.
    pub fn snapshot(&self, job_id: JobId) -> Option<ProgressSnapshot> {
        self.inner.read().ok()?.get(&job_id).cloned()
    }

    pub fn evict(&self, job_id: JobId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&job_id);
        }
    }

    /// Evicts terminal snapshots that have not been touched for `age`.
    /// Running jobs are never evicted here; their entries are as fresh as
    /// their last tick.
    pub fn evict_finished_older_than(&self, age: TimeDelta) {
        let cutoff = Utc::now() - age;
        if let Ok(mut map) = self.inner.write() {
            map.retain(|_, snapshot| {
                !snapshot.status.is_terminal() || snapshot.updated_at >= cutoff
            });
        }
    }

    fn write(&self, job_id: JobId, status: JobStatus, update: ProgressUpdate) {
        let Ok(mut map) = self.inner.write() else {
            tracing::warn!(%job_id, "Progress channel lock poisoned, dropping update");
            return;
        };
        map.insert(
            job_id,
            ProgressSnapshot {
                job_id,
                status,
                current_item: update.current_item,
                total_items: update.total_items,
                percent: job::percent(update.current_item, update.total_items),
                current_item_label: update.current_item_label,
                message: update.message,
                remaining_cooldown_seconds: update.remaining_cooldown_seconds,
                updated_at: Utc::now(),
            },
        );
    }
}

impl From<&Job> for ProgressSnapshot {
    /// Fallback for pollers when no live snapshot exists (job finished and
    /// was evicted, or the process restarted).
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            current_item: job.current_item,
            total_items: job.total_items,
            percent: job.percent(),
            current_item_label: job.current_item_label.clone(),
            message: job.message.clone(),
            remaining_cooldown_seconds: job.remaining_cooldown(Utc::now()),
            updated_at: job.finished_at.unwrap_or(job.inserted_at),
        }
    }
}
