//! The fetch orchestration: pull recent videos from a set of source creators
//! into the pending pool.
//!
//! Sources are processed strictly in request order. A source that cannot be
//! reached contributes zero items and the batch moves on; one bad source never
//! sinks the batch. Discovered URLs are deduplicated both within the batch and
//! against the catalog, so re-running a fetch is safe.
use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    job::{
        runner::{JobContext, Orchestration, Outcome},
        JobKind,
    },
    progress::ProgressUpdate,
    store::JobUpdate,
};

/// The input to a fetch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Content theme the discovered videos are filed under.
    pub theme: String,
    /// Source creator usernames, fetched in order.
    pub sources: Vec<String>,
    /// Upper bound on items pulled per source.
    pub items_per_source: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidFetchRequest {
    #[error("Fetch request has an empty theme")]
    EmptyTheme,
    #[error("Fetch request has no sources")]
    NoSources,
    #[error("Fetch request asks for zero items per source")]
    ZeroItemsPerSource,
}

impl FetchRequest {
    pub(crate) fn validate(&self) -> Result<(), InvalidFetchRequest> {
        if self.theme.trim().is_empty() {
            return Err(InvalidFetchRequest::EmptyTheme);
        }
        if self.sources.is_empty() {
            return Err(InvalidFetchRequest::NoSources);
        }
        if self.items_per_source == 0 {
            return Err(InvalidFetchRequest::ZeroItemsPerSource);
        }
        Ok(())
    }

    /// Upper bound on items this request can discover, used as the record's
    /// `total_items`.
    pub(crate) fn max_items(&self) -> u32 {
        (self.sources.len() as u32).saturating_mul(self.items_per_source)
    }
}

pub(crate) struct FetchJob {
    pub(crate) request: FetchRequest,
}

#[async_trait::async_trait]
impl Orchestration for FetchJob {
    const KIND: JobKind = JobKind::Fetch;

    async fn run(self, ctx: &JobContext) -> Outcome {
        let FetchRequest {
            theme,
            sources,
            items_per_source,
        } = self.request;
        let source_count = sources.len();

        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut discovered = 0u32;
        let mut new_items = 0u32;
        let mut unavailable = 0usize;

        for (index, source) in sources.iter().enumerate() {
            // Cancellation is observed between sources, never mid-call.
            if ctx.cancel_requested() {
                return Outcome::Cancelled {
                    message: format!("Cancelled after {index} of {source_count} sources"),
                };
            }

            ctx.report(ProgressUpdate {
                current_item: index as u32,
                total_items: source_count as u32,
                current_item_label: Some(source.clone()),
                message: format!("Fetching from {source}"),
                remaining_cooldown_seconds: None,
            });

            let items = match ctx.media().fetch_latest(source, &theme, items_per_source).await {
                Ok(items) => items,
                Err(err) => {
                    tracing::warn!(%err, %source, "Source unavailable, continuing with remaining sources");
                    unavailable += 1;
                    Vec::new()
                }
            };

            let mut new_from_source = 0u32;
            for item in &items {
                if !seen.insert(item.url.clone()) {
                    continue;
                }
                match ctx.videos().insert_pending(&item.url, &theme).await {
                    Ok(true) => new_from_source += 1,
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!(%err, url = %item.url, "Failed to file discovered video, skipping")
                    }
                }
            }
            discovered += items.len() as u32;
            new_items += new_from_source;

            if let Err(err) = ctx.sources().record_fetch(source, new_from_source).await {
                tracing::warn!(%err, %source, "Failed to record source fetch stats");
            }
            // Advance the live snapshot past this source so the terminal
            // snapshot reads n of n, not n-1.
            ctx.report(ProgressUpdate {
                current_item: (index + 1) as u32,
                total_items: source_count as u32,
                current_item_label: Some(source.clone()),
                message: format!("Fetched {source}: {new_from_source} new"),
                remaining_cooldown_seconds: None,
            });
            ctx.checkpoint(
                JobUpdate::progress(discovered, format!("Fetched {source}: {new_from_source} new"))
                    .with_current_item_label(source),
            )
            .await;
        }

        // Discovering nothing, even because every source was unreachable, is
        // a completed fetch, not a failed one.
        let mut message = format!("Fetched {new_items} new videos from {source_count} sources");
        if unavailable > 0 {
            message.push_str(&format!(" ({unavailable} unavailable)"));
        }
        Outcome::Success { message }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        catalog::{memory::InMemoryVideoStore, VideoStatus, VideoStore},
        platform::{test::ScriptedSource, DiscoveredItem, MockMediaSource},
        test_support,
    };

    fn request(sources: &[&str]) -> FetchRequest {
        FetchRequest {
            theme: "gaming".to_owned(),
            sources: sources.iter().map(|s| (*s).to_owned()).collect(),
            items_per_source: 10,
        }
    }

    #[test]
    fn validation_rejects_degenerate_requests() {
        assert_eq!(
            request(&["a"]).validate(),
            Ok(()),
        );
        assert_eq!(
            FetchRequest {
                theme: "  ".to_owned(),
                ..request(&["a"])
            }
            .validate(),
            Err(InvalidFetchRequest::EmptyTheme)
        );
        assert_eq!(
            request(&[]).validate(),
            Err(InvalidFetchRequest::NoSources)
        );
        assert_eq!(
            FetchRequest {
                items_per_source: 0,
                ..request(&["a"])
            }
            .validate(),
            Err(InvalidFetchRequest::ZeroItemsPerSource)
        );
    }

    #[tokio::test]
    async fn discovers_new_videos_and_skips_known_ones() {
        let videos = InMemoryVideoStore::new();
        videos.seed("https://tiktok.com/v/a", "gaming", VideoStatus::Uploaded);
        let sources = crate::catalog::memory::InMemorySourceStore::new();
        let shared = test_support::SharedBuilder::default()
            .media(
                ScriptedSource::default()
                    .returns("creator_a", &["https://tiktok.com/v/a", "https://tiktok.com/v/b"])
                    .returns("creator_b", &["https://tiktok.com/v/b", "https://tiktok.com/v/c"]),
            )
            .videos(videos.clone())
            .sources(sources.clone())
            .build();
        let ctx = test_support::context(&shared, JobKind::Fetch).await;

        let outcome = FetchJob {
            request: request(&["creator_a", "creator_b"]),
        }
        .run(&ctx)
        .await;

        let Outcome::Success { message } = outcome else {
            panic!("expected success");
        };
        assert_eq!(message, "Fetched 2 new videos from 2 sources");

        let pending = videos
            .list_by_theme("gaming", Some(VideoStatus::Pending))
            .await
            .unwrap();
        let mut urls: Vec<_> = pending.iter().map(|video| video.url.as_str()).collect();
        urls.sort_unstable();
        assert_eq!(urls, vec!["https://tiktok.com/v/b", "https://tiktok.com/v/c"]);

        assert_eq!(sources.fetched_count("creator_a"), 1);
        assert_eq!(sources.fetched_count("creator_b"), 1);
    }

    #[tokio::test]
    async fn unavailable_source_does_not_sink_the_batch() {
        let videos = InMemoryVideoStore::new();
        videos.seed("https://tiktok.com/v/1", "gaming", VideoStatus::Uploaded);
        videos.seed("https://tiktok.com/v/2", "gaming", VideoStatus::Pending);
        let shared = test_support::SharedBuilder::default()
            .media(
                ScriptedSource::default()
                    .fails("creator_a", "rate limited")
                    .returns(
                        "creator_b",
                        &[
                            "https://tiktok.com/v/1",
                            "https://tiktok.com/v/2",
                            "https://tiktok.com/v/3",
                            "https://tiktok.com/v/4",
                            "https://tiktok.com/v/5",
                        ],
                    ),
            )
            .videos(videos.clone())
            .build();
        let ctx = test_support::context(&shared, JobKind::Fetch).await;

        let outcome = FetchJob {
            request: request(&["creator_a", "creator_b"]),
        }
        .run(&ctx)
        .await;

        // Three of the five were new; the two known URLs were skipped.
        let Outcome::Success { message } = outcome else {
            panic!("expected success");
        };
        assert_eq!(message, "Fetched 3 new videos from 2 sources (1 unavailable)");
        assert!(videos.get("https://tiktok.com/v/5").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn a_source_with_nothing_new_is_still_a_success() {
        let shared = test_support::SharedBuilder::default()
            .media(ScriptedSource::default())
            .build();
        let ctx = test_support::context(&shared, JobKind::Fetch).await;

        let outcome = FetchJob {
            request: request(&["creator_a"]),
        }
        .run(&ctx)
        .await;

        let Outcome::Success { message } = outcome else {
            panic!("expected success");
        };
        assert_eq!(message, "Fetched 0 new videos from 1 sources");
    }

    #[tokio::test]
    async fn every_source_unavailable_still_completes_with_zero_results() {
        let shared = test_support::SharedBuilder::default()
            .media(
                ScriptedSource::default()
                    .fails("creator_a", "rate limited")
                    .fails("creator_b", "session expired"),
            )
            .build();
        let ctx = test_support::context(&shared, JobKind::Fetch).await;

        let outcome = FetchJob {
            request: request(&["creator_a", "creator_b"]),
        }
        .run(&ctx)
        .await;

        // An empty harvest is a completed fetch; the message carries the bad
        // news instead of the status.
        let Outcome::Success { message } = outcome else {
            panic!("expected success");
        };
        assert_eq!(message, "Fetched 0 new videos from 2 sources (2 unavailable)");
    }

    #[tokio::test]
    async fn cancellation_before_the_first_source_fetches_nothing() {
        let videos = InMemoryVideoStore::new();
        let shared = test_support::SharedBuilder::default()
            .media(ScriptedSource::default().returns("creator_a", &["https://tiktok.com/v/a"]))
            .videos(videos.clone())
            .build();
        let ctx = test_support::context(&shared, JobKind::Fetch).await;
        ctx.token.cancel();

        let outcome = FetchJob {
            request: request(&["creator_a", "creator_b"]),
        }
        .run(&ctx)
        .await;

        let Outcome::Cancelled { message } = outcome else {
            panic!("expected cancellation");
        };
        assert_eq!(message, "Cancelled after 0 of 2 sources");
        assert!(videos.get("https://tiktok.com/v/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn passes_the_per_source_limit_through() {
        let mut media = MockMediaSource::new();
        media
            .expect_fetch_latest()
            .withf(|source, theme, limit| source == "creator_a" && theme == "gaming" && *limit == 3)
            .times(1)
            .returning(|_, _, _| Ok(vec![DiscoveredItem::new("https://tiktok.com/v/a")]));
        let shared = test_support::SharedBuilder::default().media(media).build();
        let ctx = test_support::context(&shared, JobKind::Fetch).await;

        let outcome = FetchJob {
            request: FetchRequest {
                items_per_source: 3,
                ..request(&["creator_a"])
            },
        }
        .run(&ctx)
        .await;

        assert!(matches!(outcome, Outcome::Success { .. }));
    }
}
