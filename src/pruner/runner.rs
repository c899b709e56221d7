use std::{ops::Sub, sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use super::PrunerConfig;
use crate::Shared;

/// Runs the retention sweep on the configured cron schedule until the
/// cancellation token fires at shutdown.
pub(crate) struct PrunerRunner {
    config: PrunerConfig,
    shared: Arc<Shared>,
}

impl PrunerRunner {
    pub(crate) fn new(shared: Arc<Shared>, config: PrunerConfig) -> Self {
        Self { config, shared }
    }

    pub(crate) fn spawn(self, cancellation_token: CancellationToken) {
        tokio::spawn(async move {
            loop {
                let Some(next) = self.config.schedule.upcoming(Utc).next() else {
                    tracing::error!("Pruner schedule has no future occurrence, stopping pruner");
                    break;
                };
                let delay = next
                    .sub(Utc::now())
                    .sub(TimeDelta::milliseconds(10))
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        self.sweep().await;
                        let delay = next - Utc::now();
                        if delay > TimeDelta::zero() {
                            tokio::time::sleep(delay.to_std().unwrap_or(Duration::ZERO)).await;
                        }
                    }
                    _ = cancellation_token.cancelled() => {
                        tracing::debug!("Shutting down the job pruner");
                        break;
                    },
                }
            }
        });
    }

    /// One retention pass: prune matching records, then evict the progress
    /// snapshots of exactly the records that were removed.
    pub(crate) async fn sweep(&self) {
        for spec in &self.config.pruners {
            match self.shared.store.prune(spec).await {
                Ok(removed) => {
                    if !removed.is_empty() {
                        tracing::debug!(count = removed.len(), ?spec, "Pruned finished jobs");
                    }
                    for job_id in removed {
                        self.shared.progress.evict(job_id);
                    }
                }
                Err(err) => {
                    tracing::error!(?err, "Failed to prune jobs with error {err}");
                }
            }
        }
    }
}
