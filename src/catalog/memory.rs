//! In memory implementations of the catalog stores, for tests and embedded
//! setups.
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxhash::FxHashMap;

use super::{Account, AccountStatus, AccountStore, SourceStore, Video, VideoStatus, VideoStore};
use crate::store::StoreError;

/// An in memory implementation of [`VideoStore`], keyed by URL.
#[derive(Clone, Default)]
pub struct InMemoryVideoStore {
    videos: Arc<RwLock<FxHashMap<String, Video>>>,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an item with a given status, for tests.
    pub fn seed(&self, url: &str, theme: &str, status: VideoStatus) {
        if let Ok(mut map) = self.videos.write() {
            map.insert(
                url.to_owned(),
                Video {
                    url: url.to_owned(),
                    theme: theme.to_owned(),
                    status,
                    inserted_at: Utc::now(),
                },
            );
        }
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn insert_pending(&self, url: &str, theme: &str) -> Result<bool, StoreError> {
        let mut map = self.videos.write().map_err(|_| StoreError::BadState)?;
        if map.contains_key(url) {
            return Ok(false);
        }
        map.insert(
            url.to_owned(),
            Video {
                url: url.to_owned(),
                theme: theme.to_owned(),
                status: VideoStatus::Pending,
                inserted_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn set_status(&self, url: &str, status: VideoStatus) -> Result<(), StoreError> {
        let mut map = self.videos.write().map_err(|_| StoreError::BadState)?;
        match map.get_mut(url) {
            None => Err(StoreError::RowNotFound(url.to_owned())),
            Some(video) => {
                // Item transitions are one-directional.
                if status.rank() < video.status.rank() {
                    tracing::warn!(url, from = ?video.status, to = ?status, "Ignoring backwards video status transition");
                } else {
                    video.status = status;
                }
                Ok(())
            }
        }
    }

    async fn get(&self, url: &str) -> Result<Option<Video>, StoreError> {
        Ok(self
            .videos
            .read()
            .map_err(|_| StoreError::BadState)?
            .get(url)
            .cloned())
    }

    async fn list_by_theme(
        &self,
        theme: &str,
        status: Option<VideoStatus>,
    ) -> Result<Vec<Video>, StoreError> {
        let mut videos: Vec<_> = self
            .videos
            .read()
            .map_err(|_| StoreError::BadState)?
            .values()
            .filter(|video| {
                video.theme == theme && status.map_or(true, |status| video.status == status)
            })
            .cloned()
            .collect();
        videos.sort_by(|a, b| a.inserted_at.cmp(&b.inserted_at));
        Ok(videos)
    }
}

#[derive(Debug, Clone)]
struct SourceStats {
    last_fetched_at: DateTime<Utc>,
    fetched_count: u32,
}

/// An in memory implementation of [`SourceStore`].
#[derive(Clone, Default)]
pub struct InMemorySourceStore {
    sources: Arc<RwLock<FxHashMap<String, SourceStats>>>,
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetched_count(&self, source: &str) -> u32 {
        self.sources
            .read()
            .ok()
            .and_then(|map| map.get(source).map(|stats| stats.fetched_count))
            .unwrap_or(0)
    }
}

#[async_trait]
impl SourceStore for InMemorySourceStore {
    async fn record_fetch(&self, source: &str, fetched: u32) -> Result<(), StoreError> {
        let mut map = self.sources.write().map_err(|_| StoreError::BadState)?;
        let stats = map.entry(source.to_owned()).or_insert(SourceStats {
            last_fetched_at: Utc::now(),
            fetched_count: 0,
        });
        stats.last_fetched_at = Utc::now();
        stats.fetched_count += fetched;
        Ok(())
    }
}

/// An in memory implementation of [`AccountStore`].
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<FxHashMap<String, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        if let Ok(mut map) = self.accounts.write() {
            map.insert(account.username.clone(), account);
        }
    }

    /// Convenience constructor for a single active account.
    pub fn with_active_account(username: &str, theme: &str) -> Self {
        let store = Self::new();
        store.insert(Account {
            username: username.to_owned(),
            theme: theme.to_owned(),
            status: AccountStatus::Active,
            posts_count: 0,
            last_post_at: None,
        });
        store
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .read()
            .map_err(|_| StoreError::BadState)?
            .get(username)
            .cloned())
    }

    async fn record_post(&self, username: &str) -> Result<(), StoreError> {
        let mut map = self.accounts.write().map_err(|_| StoreError::BadState)?;
        match map.get_mut(username) {
            None => Err(StoreError::RowNotFound(username.to_owned())),
            Some(account) => {
                account.posts_count += 1;
                account.last_post_at = Some(Utc::now());
                Ok(())
            }
        }
    }
}
