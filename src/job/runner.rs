use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

use crate::{
    catalog::{AccountStore, SourceStore, VideoStore},
    job::{JobId, JobKind, JobStatus},
    platform::{Event, MediaSource, Publisher},
    progress::ProgressUpdate,
    store::JobUpdate,
    Shared,
};

/// How a job body ended. The runner maps this onto the terminal status and
/// the final record/snapshot/notification writes.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success { message: String },
    Failed { message: String },
    Cancelled { message: String },
}

/// A job body: one fetch or upload orchestration.
#[async_trait]
pub(crate) trait Orchestration: Send + Sync + 'static {
    const KIND: JobKind;

    async fn run(self, ctx: &JobContext) -> Outcome;
}

/// Everything a job body needs: the shared stores and collaborators plus this
/// job's identity and cancellation handle.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub(crate) shared: Arc<Shared>,
    pub(crate) job_id: JobId,
    pub(crate) token: CancellationToken,
}

impl JobContext {
    pub(crate) fn cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Overwrites the live progress snapshot. Cheap enough to call every
    /// cooldown tick.
    pub(crate) fn report(&self, update: ProgressUpdate) {
        self.shared.progress.set(self.job_id, update);
    }

    /// Best-effort durable write. A store outage is logged and dropped, never
    /// surfaced into the job body.
    pub(crate) async fn checkpoint(&self, update: JobUpdate) {
        if let Err(err) = self.shared.store.update(self.job_id, update).await {
            tracing::warn!(?err, job_id = %self.job_id, "Failed to persist job checkpoint, continuing");
        }
    }

    /// Fire-and-forget notification, off the critical path.
    pub(crate) fn notify(&self, event: Event) {
        let notifier = Arc::clone(&self.shared.notifier);
        tokio::spawn(async move { notifier.notify(event).await });
    }

    pub(crate) fn media(&self) -> &dyn MediaSource {
        self.shared.media.as_ref()
    }

    pub(crate) fn publisher(&self) -> &dyn Publisher {
        self.shared.publisher.as_ref()
    }

    pub(crate) fn videos(&self) -> &dyn VideoStore {
        self.shared.videos.as_ref()
    }

    pub(crate) fn sources(&self) -> &dyn SourceStore {
        self.shared.sources.as_ref()
    }

    pub(crate) fn accounts(&self) -> &dyn AccountStore {
        self.shared.accounts.as_ref()
    }
}

pub(crate) struct JobRunner {
    shared: Arc<Shared>,
}

impl JobRunner {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Spawns the job body onto a worker slot. Returns immediately; the
    /// caller already holds the job id.
    pub(crate) fn spawn<O: Orchestration>(
        &self,
        job_id: JobId,
        token: CancellationToken,
        start_detail: String,
        orchestration: O,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(
            async move {
                // One job body at a time per slot; the single-writer
                // invariant for the job record follows from this.
                let _permit = match Arc::clone(&shared.slots).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                Self::execute(shared, job_id, token, start_detail, orchestration).await;
            }
            .in_current_span(),
        )
    }

    #[instrument(skip_all, fields(job_id = %job_id, kind = %O::KIND))]
    async fn execute<O: Orchestration>(
        shared: Arc<Shared>,
        job_id: JobId,
        token: CancellationToken,
        start_detail: String,
        orchestration: O,
    ) {
        let ctx = JobContext {
            shared,
            job_id,
            token,
        };
        tracing::debug!(%job_id, "Executing job {job_id}");
        ctx.notify(Event::JobStarted {
            job_id,
            kind: O::KIND,
            detail: start_detail,
        });

        // The body runs in its own task so a panic is contained and
        // converted into a terminal `Failed`, never a job stuck in `Running`.
        let body_ctx = ctx.clone();
        let outcome = match tokio::spawn(
            async move { orchestration.run(&body_ctx).await }.in_current_span(),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Failed {
                message: panic_message(error),
            },
        };

        Self::finalize(&ctx, O::KIND, outcome).await;
    }

    async fn finalize(ctx: &JobContext, kind: JobKind, outcome: Outcome) {
        let job_id = ctx.job_id;
        let (status, message) = match outcome {
            Outcome::Success { message } => (JobStatus::Success, message),
            Outcome::Failed { message } => (JobStatus::Failed, message),
            Outcome::Cancelled { message } => (JobStatus::Cancelled, message),
        };
        match status {
            JobStatus::Failed => tracing::error!(%job_id, "Job {job_id} failed: {message}"),
            // Cancellation is a normal terminal outcome, not a failure.
            _ => tracing::debug!(%job_id, %status, "Job {job_id} finished: {message}"),
        }

        ctx.checkpoint(
            JobUpdate::status(status)
                .with_message(message.clone())
                .clear_cooldown(),
        )
        .await;
        // Final snapshot lands before the cancellation entry is cleared, so a
        // poller that raced a cancel request still observes the terminal
        // status.
        ctx.shared.progress.finish(job_id, status, message.clone());
        ctx.shared.cancellation.clear(job_id);
        ctx.notify(Event::JobFinished {
            job_id,
            kind,
            status,
            detail: message,
        });
    }
}

fn panic_message(error: JoinError) -> String {
    let fallback = error.to_string();
    match error.try_into_panic() {
        Ok(panic) => panic
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or(fallback),
        Err(_) => fallback,
    }
}
