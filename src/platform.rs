//! Contracts for the external platform collaborators.
//!
//! Browser automation, proxies, and platform protocols live behind these
//! traits. The orchestration core treats every call as opaque and potentially
//! slow; cancellation is only observed between calls, never by interrupting
//! one in flight.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{JobId, JobKind, JobStatus};

/// A video discovered on a source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredItem {
    pub url: String,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// Pulls the latest videos from a source creator account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fetches up to `limit` recent items for the source. A transient error
    /// is treated by the fetch job as zero items from this source.
    async fn fetch_latest(
        &self,
        source: &str,
        theme: &str,
        limit: u32,
    ) -> Result<Vec<DiscoveredItem>, SourceFetchError>;
}

#[derive(Debug, Error)]
pub enum SourceFetchError {
    /// The source is temporarily unreachable (rate limit, session expiry,
    /// network). The batch continues with the remaining sources.
    #[error("Source temporarily unavailable: {0}")]
    Transient(String),
}

/// Publishes a single item to a destination account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one item. Called at most once per item per job; retry policy
    /// is the caller's concern, not the core's.
    async fn publish(&self, account: &str, url: &str) -> Result<(), PublishError>;
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// The platform refused the item (moderation, format, account state).
    #[error("Publish rejected: {0}")]
    Rejected(String),
    /// The publish attempt did not complete (network, session, timeout).
    #[error("Publish failed: {0}")]
    Transient(String),
}

/// Best-effort external notification of job lifecycle events.
///
/// Implementations must swallow their own delivery failures; the core fires
/// notifications off the critical path and never awaits delivery before
/// continuing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: Event);
}

/// A job lifecycle event, rendered to free text for the notifier sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    JobStarted {
        job_id: JobId,
        kind: JobKind,
        detail: String,
    },
    JobFinished {
        job_id: JobId,
        kind: JobKind,
        status: JobStatus,
        detail: String,
    },
    ItemPublished {
        account: String,
        url: String,
    },
    ItemFailed {
        account: String,
        url: String,
        reason: String,
    },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::JobStarted { job_id, kind, detail } => {
                write!(f, "{kind} job {job_id} started: {detail}")
            }
            Event::JobFinished {
                job_id,
                kind,
                status,
                detail,
            } => write!(f, "{kind} job {job_id} {status}: {detail}"),
            Event::ItemPublished { account, url } => {
                write!(f, "Published {url} to @{account}")
            }
            Event::ItemFailed {
                account,
                url,
                reason,
            } => write!(f, "Failed to publish {url} to @{account}: {reason}"),
        }
    }
}

/// A notifier that only logs. The default when no external sink is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: Event) {
        tracing::info!(%event, "job event");
    }
}
