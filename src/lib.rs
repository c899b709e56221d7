//! Job orchestration core for crossposting short videos from source creator
//! accounts to destination platform accounts.
//!
//! The crate runs two kinds of job: a *fetch* discovers recent videos from a
//! set of source creators and files them into a pending pool, and an *upload*
//! publishes an explicit list of videos to one destination account, pacing
//! consecutive publishes with randomized cooldowns. Every job writes a durable
//! [`job::Job`] record through an injected [`store::JobStore`], mirrors its
//! fine-grained progress into an in-memory [`progress::ProgressChannel`], and
//! can be cancelled cooperatively at item and cooldown-tick boundaries.
//!
//! The actual platform protocols (scraping, browser automation, posting) stay
//! behind the [`platform::MediaSource`] and [`platform::Publisher`] traits;
//! this crate only decides what to call, in what order, and how to survive the
//! failures.
//!
//! # Getting started
//!
//! Wire the stores and platform collaborators into a [`Crosspost`] engine via
//! the builder, then enqueue jobs:
//!
//! ```
//! use crosspost::prelude::*;
//! # use crosspost::catalog::memory::{
//! #     InMemoryAccountStore, InMemorySourceStore, InMemoryVideoStore,
//! # };
//! # use crosspost::platform::{
//! #     DiscoveredItem, MediaSource, PublishError, Publisher, SourceFetchError,
//! # };
//! # use crosspost::store::memory::InMemoryJobStore;
//! # use async_trait::async_trait;
//! #
//! # struct Scraper;
//! # #[async_trait]
//! # impl MediaSource for Scraper {
//! #     async fn fetch_latest(
//! #         &self,
//! #         _source: &str,
//! #         _theme: &str,
//! #         _limit: u32,
//! #     ) -> Result<Vec<DiscoveredItem>, SourceFetchError> {
//! #         Ok(vec![DiscoveredItem::new("https://example.com/v/1")])
//! #     }
//! # }
//! # struct Poster;
//! # #[async_trait]
//! # impl Publisher for Poster {
//! #     async fn publish(&self, _account: &str, _url: &str) -> Result<(), PublishError> {
//! #         Ok(())
//! #     }
//! # }
//! #
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CrosspostBuilder::default()
//!     .with_job_store(InMemoryJobStore::new())
//!     .with_video_store(InMemoryVideoStore::new())
//!     .with_source_store(InMemorySourceStore::new())
//!     .with_account_store(InMemoryAccountStore::with_active_account(
//!         "creator1", "gaming",
//!     ))
//!     .with_media_source(Scraper)
//!     .with_publisher(Poster)
//!     .build()?;
//!
//! let job_id = engine
//!     .enqueue_fetch(FetchRequest {
//!         theme: "gaming".to_owned(),
//!         sources: vec!["creator_a".to_owned()],
//!         items_per_source: 5,
//!     })
//!     .await?;
//!
//! // Pollers read live progress while the job runs...
//! let _snapshot = engine.job_progress(job_id).await?;
//! // ...and anyone can request cancellation; the job observes it at the
//! // next item or cooldown-tick boundary.
//! engine.cancel(job_id);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub mod cancellation;
pub mod catalog;
pub mod cooldown;
pub mod fetch;
pub mod job;
pub mod platform;
pub mod prelude;
pub mod progress;
pub mod pruner;
pub mod store;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

use cancellation::CancellationRegistry;
use catalog::{AccountStore, SourceStore, VideoStore};
use cooldown::CooldownRange;
use fetch::{FetchJob, FetchRequest};
use job::{runner::JobRunner, Job, JobId, JobKind, JobStatus};
use platform::{LogNotifier, MediaSource, Notifier, Publisher};
use progress::{ProgressChannel, ProgressSnapshot, ProgressUpdate};
use pruner::{runner::PrunerRunner, PrunerConfig};
use store::{JobStore, NewJob, StoreError};
use upload::{UploadJob, UploadRequest};

/// Tunables for job execution.
#[derive(Debug, Clone)]
pub struct Config {
    /// The cooldown sampled between consecutive publishes of an upload job.
    pub cooldown: CooldownRange,
    /// Granularity of the cancellable cooldown sleep. Bounds cancellation
    /// latency during a cooldown.
    pub cooldown_tick: Duration,
    /// How many jobs may execute concurrently. The production deployments
    /// drive a single shared browser session, hence the default of one.
    pub worker_slots: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cooldown: CooldownRange::DEFAULT,
            cooldown_tick: Duration::from_secs(1),
            worker_slots: 1,
        }
    }
}

/// Everything the worker tasks share: the injected stores and platform
/// collaborators plus the engine-owned channels.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) videos: Arc<dyn VideoStore>,
    pub(crate) sources: Arc<dyn SourceStore>,
    pub(crate) accounts: Arc<dyn AccountStore>,
    pub(crate) media: Arc<dyn MediaSource>,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) progress: ProgressChannel,
    pub(crate) cancellation: CancellationRegistry,
    pub(crate) slots: Arc<Semaphore>,
    pub(crate) config: Config,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error(transparent)]
    InvalidFetch(#[from] fetch::InvalidFetchRequest),
    #[error(transparent)]
    InvalidUpload(#[from] upload::InvalidUploadRequest),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to encode job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("Missing required component: {0}")]
    MissingComponent(&'static str),
}

/// Builder for the [`Crosspost`] engine.
///
/// The stores and platform collaborators are required; the notifier defaults
/// to [`LogNotifier`] and the pruner is optional.
#[derive(Default)]
pub struct CrosspostBuilder {
    store: Option<Arc<dyn JobStore>>,
    videos: Option<Arc<dyn VideoStore>>,
    sources: Option<Arc<dyn SourceStore>>,
    accounts: Option<Arc<dyn AccountStore>>,
    media: Option<Arc<dyn MediaSource>>,
    publisher: Option<Arc<dyn Publisher>>,
    notifier: Option<Arc<dyn Notifier>>,
    config: Option<Config>,
    pruner: Option<PrunerConfig>,
}

impl CrosspostBuilder {
    pub fn with_job_store(mut self, store: impl JobStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn with_video_store(mut self, videos: impl VideoStore + 'static) -> Self {
        self.videos = Some(Arc::new(videos));
        self
    }

    pub fn with_source_store(mut self, sources: impl SourceStore + 'static) -> Self {
        self.sources = Some(Arc::new(sources));
        self
    }

    pub fn with_account_store(mut self, accounts: impl AccountStore + 'static) -> Self {
        self.accounts = Some(Arc::new(accounts));
        self
    }

    pub fn with_media_source(mut self, media: impl MediaSource + 'static) -> Self {
        self.media = Some(Arc::new(media));
        self
    }

    pub fn with_publisher(mut self, publisher: impl Publisher + 'static) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Enables the scheduled retention sweep for finished jobs.
    pub fn with_pruner(mut self, pruner: PrunerConfig) -> Self {
        self.pruner = Some(pruner);
        self
    }

    /// Builds the engine and, if configured, spawns the pruner. Must be
    /// called from within a tokio runtime.
    pub fn build(self) -> Result<Crosspost, BuilderError> {
        let config = self.config.unwrap_or_default();
        let shared = Arc::new(Shared {
            store: self
                .store
                .ok_or(BuilderError::MissingComponent("job store"))?,
            videos: self
                .videos
                .ok_or(BuilderError::MissingComponent("video store"))?,
            sources: self
                .sources
                .ok_or(BuilderError::MissingComponent("source store"))?,
            accounts: self
                .accounts
                .ok_or(BuilderError::MissingComponent("account store"))?,
            media: self
                .media
                .ok_or(BuilderError::MissingComponent("media source"))?,
            publisher: self
                .publisher
                .ok_or(BuilderError::MissingComponent("publisher"))?,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            progress: ProgressChannel::new(),
            cancellation: CancellationRegistry::new(),
            slots: Arc::new(Semaphore::new(config.worker_slots)),
            config,
        });

        let pruner_token = CancellationToken::new();
        if let Some(pruner) = self.pruner {
            PrunerRunner::new(Arc::clone(&shared), pruner).spawn(pruner_token.clone());
        }

        Ok(Crosspost {
            runner: JobRunner::new(Arc::clone(&shared)),
            shared,
            handles: Mutex::new(Vec::new()),
            pruner_token,
        })
    }
}

/// The crossposting engine.
///
/// Owns the worker slots, the live progress channel, and the cancellation
/// registry. Jobs begin executing as soon as a slot frees up; there is no
/// queued state visible to callers.
pub struct Crosspost {
    shared: Arc<Shared>,
    runner: JobRunner,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pruner_token: CancellationToken,
}

impl Crosspost {
    /// Starts a fetch job: discover recent videos from `sources` and file the
    /// new ones under `theme`.
    ///
    /// Returns as soon as the job record exists; the body runs on a worker
    /// slot. Validation failures surface here and never create a record.
    pub async fn enqueue_fetch(&self, request: FetchRequest) -> Result<JobId, EnqueueError> {
        request.validate()?;
        let payload = serde_json::to_value(&request)?;
        let source_count = request.sources.len() as u32;

        let job_id = self
            .shared
            .store
            .create(NewJob {
                kind: JobKind::Fetch,
                account: None,
                message: "Starting fetch".to_owned(),
                payload,
                total_items: request.max_items(),
            })
            .await?;
        let token = self.shared.cancellation.register(job_id);
        self.shared.progress.set(
            job_id,
            ProgressUpdate {
                current_item: 0,
                total_items: source_count,
                current_item_label: None,
                message: "Starting fetch".to_owned(),
                remaining_cooldown_seconds: None,
            },
        );
        tracing::info!(%job_id, sources = source_count, theme = %request.theme, "Enqueued fetch job");

        let detail = format!("{source_count} sources, theme {}", request.theme);
        let handle = self
            .runner
            .spawn(job_id, token, detail, FetchJob { request });
        self.track(handle);
        Ok(job_id)
    }

    /// Starts an upload job: publish `video_links` to `account` in order,
    /// with a randomized cooldown between consecutive publishes.
    ///
    /// Account eligibility is checked here, once. An account blocked while
    /// the job runs does not stop it.
    pub async fn enqueue_upload(&self, request: UploadRequest) -> Result<JobId, EnqueueError> {
        let upload = UploadJob::prepare(self.shared.accounts.as_ref(), &request).await?;
        let payload = serde_json::to_value(&request)?;
        let total_items = upload.links.len() as u32;

        let job_id = self
            .shared
            .store
            .create(NewJob {
                kind: JobKind::Upload,
                account: Some(upload.account.clone()),
                message: "Starting upload".to_owned(),
                payload,
                total_items,
            })
            .await?;
        let token = self.shared.cancellation.register(job_id);
        self.shared.progress.set(
            job_id,
            ProgressUpdate {
                current_item: 0,
                total_items,
                current_item_label: None,
                message: "Starting upload".to_owned(),
                remaining_cooldown_seconds: None,
            },
        );
        tracing::info!(%job_id, account = %upload.account, videos = total_items, "Enqueued upload job");

        let detail = format!("{total_items} videos to @{}", upload.account);
        let handle = self.runner.spawn(job_id, token, detail, upload);
        self.track(handle);
        Ok(job_id)
    }

    /// The durable record for a job.
    pub async fn job(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.shared.store.get(job_id).await
    }

    /// Recent jobs, newest first, optionally filtered by status.
    pub async fn jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        self.shared.store.list(status, limit).await
    }

    /// The freshest available view of a job's progress: the live snapshot if
    /// one exists, otherwise a view derived from the durable record.
    pub async fn job_progress(&self, job_id: JobId) -> Result<ProgressSnapshot, StoreError> {
        if let Some(snapshot) = self.shared.progress.snapshot(job_id) {
            return Ok(snapshot);
        }
        Ok(ProgressSnapshot::from(&self.shared.store.get(job_id).await?))
    }

    /// Requests cooperative cancellation of a running job.
    ///
    /// Returns whether the request was delivered. `false` means the job is
    /// unknown or already finished; requesting cancellation twice is
    /// harmless. Delivery is not completion: the job winds down at its next
    /// item or cooldown-tick boundary.
    pub fn cancel(&self, job_id: JobId) -> bool {
        self.shared.cancellation.request_cancel(job_id)
    }

    /// Operator-driven removal of a single job record and its snapshot.
    pub async fn delete_job(&self, job_id: JobId) -> Result<(), StoreError> {
        self.shared.store.delete(job_id).await?;
        self.shared.progress.evict(job_id);
        Ok(())
    }

    /// Stops the pruner and waits for every in-flight job to finish.
    ///
    /// Running jobs are not cancelled; call [`Crosspost::cancel`] first for a
    /// faster exit.
    pub async fn shutdown(self) {
        tracing::debug!("Shutting down crosspost engine");
        self.pruner_token.cancel();
        if let Ok(handles) = self.handles.into_inner() {
            futures::future::join_all(handles).await;
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.handles.lock() {
            Ok(mut handles) => {
                // Drop handles of jobs that already finished so the list does
                // not grow with engine lifetime.
                handles.retain(|handle| !handle.is_finished());
                handles.push(handle);
            }
            Err(_) => {
                tracing::warn!("Job handle lock poisoned, handle not tracked for shutdown");
            }
        }
    }
}
