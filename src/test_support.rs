//! Shared fixtures for the crate's tests.
use std::{sync::Arc, time::Duration};

use tokio::sync::Semaphore;

use crate::{
    cancellation::CancellationRegistry,
    catalog::memory::{InMemoryAccountStore, InMemorySourceStore, InMemoryVideoStore},
    job::{runner::JobContext, JobKind},
    platform::{
        test::{ScriptedPublisher, ScriptedSource},
        LogNotifier, MediaSource, Notifier, Publisher,
    },
    progress::ProgressChannel,
    store::{memory::InMemoryJobStore, NewJob},
    Config, Shared,
};

/// Builds a [`Shared`] around in-memory stores and scripted collaborators.
/// Tests keep clones of the concrete stores they want to assert against.
#[derive(Default)]
pub(crate) struct SharedBuilder {
    media: Option<Arc<dyn MediaSource>>,
    publisher: Option<Arc<dyn Publisher>>,
    notifier: Option<Arc<dyn Notifier>>,
    videos: Option<InMemoryVideoStore>,
    sources: Option<InMemorySourceStore>,
    accounts: Option<InMemoryAccountStore>,
    config: Option<Config>,
}

impl SharedBuilder {
    pub(crate) fn media(mut self, media: impl MediaSource + 'static) -> Self {
        self.media = Some(Arc::new(media));
        self
    }

    pub(crate) fn publisher(mut self, publisher: impl Publisher + 'static) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    pub(crate) fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub(crate) fn videos(mut self, videos: InMemoryVideoStore) -> Self {
        self.videos = Some(videos);
        self
    }

    pub(crate) fn sources(mut self, sources: InMemorySourceStore) -> Self {
        self.sources = Some(sources);
        self
    }

    pub(crate) fn accounts(mut self, accounts: InMemoryAccountStore) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub(crate) fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub(crate) fn build(self) -> Arc<Shared> {
        let config = self.config.unwrap_or_else(test_config);
        Arc::new(Shared {
            store: Arc::new(InMemoryJobStore::new()),
            videos: Arc::new(self.videos.unwrap_or_default()),
            sources: Arc::new(self.sources.unwrap_or_default()),
            accounts: Arc::new(self.accounts.unwrap_or_default()),
            media: self
                .media
                .unwrap_or_else(|| Arc::new(ScriptedSource::default())),
            publisher: self
                .publisher
                .unwrap_or_else(|| Arc::new(ScriptedPublisher::default())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            progress: ProgressChannel::new(),
            cancellation: CancellationRegistry::new(),
            slots: Arc::new(Semaphore::new(config.worker_slots)),
            config,
        })
    }
}

/// Millisecond-scale cooldowns so upload tests finish quickly.
pub(crate) fn test_config() -> Config {
    Config {
        cooldown: crate::cooldown::CooldownRange::fixed(Duration::from_millis(30)),
        cooldown_tick: Duration::from_millis(10),
        worker_slots: 1,
    }
}

pub(crate) fn shared() -> Arc<Shared> {
    SharedBuilder::default().build()
}

pub(crate) fn shared_with_notifier(notifier: impl Notifier + 'static) -> Arc<Shared> {
    SharedBuilder::default().notifier(notifier).build()
}

/// Creates a running job record plus its registered cancellation token, ready
/// for an orchestration body to be driven directly.
pub(crate) async fn context(shared: &Arc<Shared>, kind: JobKind) -> JobContext {
    let job_id = shared
        .store
        .create(NewJob {
            kind,
            account: None,
            message: "Starting".to_owned(),
            payload: serde_json::Value::Null,
            total_items: 0,
        })
        .await
        .unwrap();
    let token = shared.cancellation.register(job_id);
    JobContext {
        shared: Arc::clone(shared),
        job_id,
        token,
    }
}

/// Polls `predicate` until it holds or `timeout` elapses.
pub(crate) async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !predicate() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
