//! The upload orchestration: publish an explicit list of videos to one
//! destination account, pacing the publishes with randomized cooldowns.
//!
//! Items are processed strictly in request order. Each item gets at most one
//! publish attempt; a failed item is recorded and the job moves on. Between
//! consecutive items the job sleeps a randomized cooldown in small ticks so a
//! cancel request lands within a tick, not after the full cooldown.
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    catalog::{AccountStatus, AccountStore, VideoStatus},
    cooldown::{tick_wait, WaitOutcome},
    job::{
        runner::{JobContext, Orchestration, Outcome},
        JobKind,
    },
    platform::Event,
    progress::ProgressUpdate,
    store::JobUpdate,
    EnqueueError,
};

/// The input to an upload job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Destination account username.
    pub account: String,
    /// Video URLs to publish, in order.
    pub video_links: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidUploadRequest {
    #[error("Upload request has no videos")]
    NoItems,
    #[error("No account named {0}")]
    AccountNotFound(String),
    #[error("Account {username} is not eligible to post ({status})")]
    AccountNotEligible {
        username: String,
        status: AccountStatus,
    },
}

#[derive(Debug)]
pub(crate) struct UploadJob {
    pub(crate) account: String,
    /// Deduplicated, original order preserved.
    pub(crate) links: Vec<String>,
}

impl UploadJob {
    /// Validates the request against the account catalog. Eligibility is
    /// checked once, here; an account blocked mid-job does not stop the run.
    pub(crate) async fn prepare(
        accounts: &dyn AccountStore,
        request: &UploadRequest,
    ) -> Result<Self, EnqueueError> {
        let mut links = Vec::with_capacity(request.video_links.len());
        for link in &request.video_links {
            if !links.contains(link) {
                links.push(link.clone());
            }
        }
        if links.is_empty() {
            return Err(InvalidUploadRequest::NoItems.into());
        }
        let account = accounts
            .get(&request.account)
            .await?
            .ok_or_else(|| InvalidUploadRequest::AccountNotFound(request.account.clone()))?;
        if account.status != AccountStatus::Active {
            return Err(InvalidUploadRequest::AccountNotEligible {
                username: account.username,
                status: account.status,
            }
            .into());
        }
        Ok(Self {
            account: account.username,
            links,
        })
    }
}

#[async_trait::async_trait]
impl Orchestration for UploadJob {
    const KIND: JobKind = JobKind::Upload;

    async fn run(self, ctx: &JobContext) -> Outcome {
        let account = self.account;
        let total = self.links.len();
        let mut uploaded = 0u32;
        let mut failed = 0u32;
        let mut skipped = 0u32;

        for (index, url) in self.links.iter().enumerate() {
            if ctx.cancel_requested() {
                return Outcome::Cancelled {
                    message: cancelled_message(index, total),
                };
            }

            let position = index + 1;
            ctx.report(ProgressUpdate {
                current_item: index as u32,
                total_items: total as u32,
                current_item_label: Some(url.clone()),
                message: format!("Uploading video {position} of {total}"),
                remaining_cooldown_seconds: None,
            });
            ctx.checkpoint(
                JobUpdate::progress(index as u32, format!("Uploading video {position} of {total}"))
                    .with_current_item_label(url),
            )
            .await;

            // An item that already made it to the destination is not
            // published twice.
            let already_uploaded = matches!(
                ctx.videos().get(url).await,
                Ok(Some(video)) if video.status == VideoStatus::Uploaded
            );
            if already_uploaded {
                tracing::debug!(%url, "Video already uploaded, skipping");
                skipped += 1;
            } else {
                match ctx.publisher().publish(&account, url).await {
                    Ok(()) => {
                        uploaded += 1;
                        record_item_status(ctx, url, VideoStatus::Uploaded).await;
                        if let Err(err) = ctx.accounts().record_post(&account).await {
                            tracing::warn!(%err, %account, "Failed to bump account post counter");
                        }
                        ctx.notify(Event::ItemPublished {
                            account: account.clone(),
                            url: url.clone(),
                        });
                    }
                    Err(err) => {
                        tracing::warn!(%err, %url, "Publish failed, continuing with remaining videos");
                        failed += 1;
                        record_item_status(ctx, url, VideoStatus::Failed).await;
                        ctx.notify(Event::ItemFailed {
                            account: account.clone(),
                            url: url.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
            // The live snapshot advances with the durable checkpoint, so a
            // poller that reads right after the terminal transition sees the
            // full item count rather than the last item's start.
            ctx.report(ProgressUpdate {
                current_item: position as u32,
                total_items: total as u32,
                current_item_label: None,
                message: format!("Processed video {position} of {total}"),
                remaining_cooldown_seconds: None,
            });
            ctx.checkpoint(JobUpdate::progress(
                position as u32,
                format!("Processed video {position} of {total}"),
            ))
            .await;

            // Cooldown between items only; the last item ends the job
            // immediately.
            if position < total {
                let cooldown = ctx.shared.config.cooldown.sample();
                let next_action_at =
                    Utc::now() + TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::zero());
                tracing::debug!(
                    seconds = cooldown.as_secs(),
                    "Cooling down before video {} of {total}",
                    position + 1
                );
                ctx.checkpoint(
                    JobUpdate::default().with_cooldown(next_action_at, cooldown.as_secs()),
                )
                .await;

                let report_tick = |remaining: std::time::Duration| {
                    ctx.report(ProgressUpdate {
                        current_item: position as u32,
                        total_items: total as u32,
                        current_item_label: None,
                        message: format!("Cooling down before video {} of {total}", position + 1),
                        remaining_cooldown_seconds: Some(remaining.as_secs()),
                    });
                };
                let outcome = tick_wait(
                    cooldown,
                    ctx.shared.config.cooldown_tick,
                    &ctx.token,
                    report_tick,
                )
                .await;
                ctx.checkpoint(JobUpdate::default().clear_cooldown()).await;
                if matches!(outcome, WaitOutcome::Cancelled) {
                    return Outcome::Cancelled {
                        message: cancelled_message(position, total),
                    };
                }
            }
        }

        let mut message = format!("{uploaded} uploaded, {failed} failed");
        if skipped > 0 {
            message.push_str(&format!(" ({skipped} already uploaded)"));
        }
        // One landed video makes the batch worthwhile.
        if uploaded > 0 {
            Outcome::Success { message }
        } else {
            Outcome::Failed { message }
        }
    }
}

fn cancelled_message(done: usize, total: usize) -> String {
    format!("Cancelled after {done} of {total} videos")
}

async fn record_item_status(ctx: &JobContext, url: &str, status: VideoStatus) {
    if let Err(err) = ctx.videos().set_status(url, status).await {
        tracing::warn!(%err, url, "Failed to record video status");
    }
}
