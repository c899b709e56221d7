//! Retention for finished jobs.
//!
//! Terminal job records and their progress snapshots are kept around so the
//! dashboard can show history, but not forever. The pruner runs on a
//! [`cron::Schedule`] and removes terminal records matching its configured
//! [`PruneSpec`]s, evicting the corresponding progress snapshots in the same
//! sweep.
//!
//! # Example
//!
//! Hourly sweep keeping a week of history, but only the last 50 cancelled
//! jobs:
//!
//! ```
//! # use crosspost::pruner::{Pruner, PrunerConfig};
//! # use crosspost::job::{JobKind, JobStatus};
//! # use std::str::FromStr;
//! # use chrono::TimeDelta;
//! let config = PrunerConfig::new(cron::Schedule::from_str("0 0 * * * *").unwrap())
//!     .with_pruner(Pruner::max_age(TimeDelta::days(7), JobStatus::Success))
//!     .with_pruner(Pruner::max_age(TimeDelta::days(7), JobStatus::Failed))
//!     .with_pruner(Pruner::max_length(50, JobStatus::Cancelled).only(JobKind::Upload));
//! ```
use chrono::TimeDelta;

use crate::job::{Job, JobKind, JobStatus};

pub(crate) mod runner;

/// When and what to prune. Passed to the engine builder via
/// [`crate::CrosspostBuilder::with_pruner`].
pub struct PrunerConfig {
    pub(crate) schedule: cron::Schedule,
    pub(crate) pruners: Vec<PruneSpec>,
}

impl PrunerConfig {
    pub fn new(schedule: cron::Schedule) -> Self {
        Self {
            schedule,
            pruners: Vec::new(),
        }
    }

    pub fn with_pruner(mut self, pruner: Pruner) -> Self {
        self.pruners.push(pruner.into());
        self
    }

    /// Adds a seven day max-age pruner for every terminal status.
    pub fn with_default_retention(self) -> Self {
        let retention = TimeDelta::days(7);
        self.with_pruner(Pruner::max_age(retention, JobStatus::Success))
            .with_pruner(Pruner::max_age(retention, JobStatus::Failed))
            .with_pruner(Pruner::max_age(retention, JobStatus::Cancelled))
    }
}

/// Configuration for a single pruner.
///
/// Prunes either by record age ([`Pruner::max_age`]) or by keeping at most a
/// fixed number of matching records ([`Pruner::max_length`]). By default a
/// pruner applies to both job kinds; restrict it with [`Pruner::only`].
pub struct Pruner {
    status: JobStatus,
    prune_by: PruneBy,
    kinds: KindSpec,
}

impl Pruner {
    /// Prune matching jobs older than `age`.
    pub const fn max_age(age: TimeDelta, status: JobStatus) -> Self {
        Self {
            status,
            prune_by: PruneBy::MaxAge(age),
            kinds: KindSpec::All,
        }
    }

    /// Keep at most `length` matching jobs, pruning the oldest first.
    pub const fn max_length(length: u32, status: JobStatus) -> Self {
        Self {
            status,
            prune_by: PruneBy::MaxLength(length),
            kinds: KindSpec::All,
        }
    }

    /// Restrict this pruner to jobs of the given kind.
    pub fn only(mut self, kind: JobKind) -> Self {
        self.kinds = KindSpec::Only(kind);
        self
    }
}

/// The specification of a single pruner, for consumption by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneSpec {
    /// The status of the jobs affected by this pruner.
    pub status: JobStatus,
    /// The pruning strategy, either max age or max length.
    pub prune_by: PruneBy,
    /// The job kinds affected by this pruner.
    pub kinds: KindSpec,
}

impl From<Pruner> for PruneSpec {
    fn from(value: Pruner) -> Self {
        Self {
            status: value.status,
            prune_by: value.prune_by,
            kinds: value.kinds,
        }
    }
}

impl PruneSpec {
    /// Whether the record is in scope for this pruner.
    pub fn matches(&self, job: &Job) -> bool {
        job.status == self.status
            && match self.kinds {
                KindSpec::All => true,
                KindSpec::Only(kind) => job.kind == kind,
            }
    }
}

/// The strategy to prune by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneBy {
    /// Remove all matching jobs that finished more than the given
    /// [`TimeDelta`] ago.
    MaxAge(TimeDelta),
    /// Keep at most the given number of matching jobs, newest first.
    MaxLength(u32),
}

/// A kind inclusion specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindSpec {
    All,
    Only(JobKind),
}
