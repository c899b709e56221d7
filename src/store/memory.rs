//! Provides an in memory implementation of [`JobStore`].
//!
//! It is a correct (but not optimized) implementation, primarily for use in
//! tests and embedded setups without a database. In particular it enforces the
//! same monotonic-status contract a production store must provide.
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc, RwLock,
};

use async_trait::async_trait;
use chrono::Utc;

use super::{JobStore, JobUpdate, NewJob, StoreError};
use crate::{
    job::{Job, JobId, JobStatus},
    pruner::{PruneBy, PruneSpec},
};

/// An in memory implementation of [`JobStore`].
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<Vec<Job>>>,
    id_counter: Arc<AtomicI32>,
}

impl InMemoryJobStore {
    /// Creates a new instance of [`InMemoryJobStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl NewJob {
    fn into_job(self, id: i32) -> Job {
        Job {
            id: id.into(),
            kind: self.kind,
            status: JobStatus::Running,
            account: self.account,
            message: self.message,
            payload: self.payload,
            total_items: self.total_items,
            current_item: 0,
            current_item_label: None,
            next_action_at: None,
            cooldown_seconds: None,
            inserted_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl Job {
    fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            if status.is_terminal() && !self.status.is_terminal() {
                self.finished_at = Some(Utc::now());
            }
            self.status = status;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(current_item) = update.current_item {
            self.current_item = current_item.min(self.total_items);
        }
        if let Some(label) = update.current_item_label {
            self.current_item_label = label;
        }
        if let Some(next_action_at) = update.next_action_at {
            self.next_action_at = next_action_at;
        }
        if let Some(cooldown_seconds) = update.cooldown_seconds {
            self.cooldown_seconds = cooldown_seconds;
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.jobs
            .write()
            .map_err(|_| StoreError::BadState)?
            .push(job.into_job(id));
        Ok(id.into())
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::NotFound(id)),
            Some(job) if job.status.is_terminal() => {
                // Late writes from a finished job body are stale; dropping the
                // whole update preserves the terminal record as-is.
                tracing::debug!(%id, status = %job.status, "Dropping update for terminal job");
                Ok(())
            }
            Some(job) => {
                job.apply(update);
                Ok(())
            }
        }
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .iter()
            .find(|job| job.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .iter()
            .filter(|job| status.map_or(true, |status| job.status == status))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.inserted_at
                .cmp(&a.inserted_at)
                .then(i32::from(b.id).cmp(&i32::from(a.id)))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        if jobs.len() == before {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn prune(&self, spec: &PruneSpec) -> Result<Vec<JobId>, StoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        let mut removed = Vec::new();
        match spec.prune_by {
            PruneBy::MaxAge(age) => {
                let cutoff = now - age;
                jobs.retain(|job| {
                    let expired = spec.matches(job)
                        && job.finished_at.unwrap_or(job.inserted_at) < cutoff;
                    if expired {
                        removed.push(job.id);
                    }
                    !expired
                });
            }
            PruneBy::MaxLength(length) => {
                let mut matching: Vec<_> = jobs.iter().filter(|job| spec.matches(job)).collect();
                matching.sort_by(|a, b| b.inserted_at.cmp(&a.inserted_at));
                removed = matching
                    .into_iter()
                    .skip(length as usize)
                    .map(|job| job.id)
                    .collect();
                jobs.retain(|job| !removed.contains(&job.id));
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::job::JobKind;
    use assert_matches::assert_matches;
    use chrono::TimeDelta;

    fn new_job(kind: JobKind, total_items: u32) -> NewJob {
        NewJob {
            kind,
            account: None,
            message: "Starting".to_owned(),
            payload: serde_json::Value::Null,
            total_items,
        }
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryJobStore::new();
        let id = store.create(new_job(JobKind::Upload, 3)).await.unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.total_items, 3);
        assert_eq!(job.current_item, 0);

        assert_matches!(
            store.get(999.into()).await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn partial_updates_only_touch_named_fields() {
        let store = InMemoryJobStore::new();
        let id = store.create(new_job(JobKind::Upload, 3)).await.unwrap();

        store
            .update(id, JobUpdate::progress(1, "Published video 1"))
            .await
            .unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.current_item, 1);
        assert_eq!(job.message, "Published video 1");
        assert_eq!(job.status, JobStatus::Running);

        let next = Utc::now() + TimeDelta::seconds(600);
        store
            .update(id, JobUpdate::default().with_cooldown(next, 600))
            .await
            .unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.cooldown_seconds, Some(600));
        assert_eq!(job.current_item, 1);

        store
            .update(id, JobUpdate::default().clear_cooldown())
            .await
            .unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.cooldown_seconds, None);
        assert_eq!(job.next_action_at, None);
    }

    #[tokio::test]
    async fn terminal_status_is_monotonic() {
        let store = InMemoryJobStore::new();
        let id = store.create(new_job(JobKind::Upload, 2)).await.unwrap();

        store
            .update(id, JobUpdate::status(JobStatus::Cancelled))
            .await
            .unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.finished_at.is_some());

        // A stale writer cannot resurrect the job or touch its fields.
        store
            .update(
                id,
                JobUpdate::status(JobStatus::Running).with_message("zombie"),
            )
            .await
            .unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_ne!(job.message, "zombie");
    }

    #[tokio::test]
    async fn current_item_never_exceeds_total() {
        let store = InMemoryJobStore::new();
        let id = store.create(new_job(JobKind::Upload, 2)).await.unwrap();

        store
            .update(id, JobUpdate::progress(7, "overshoot"))
            .await
            .unwrap();
        assert_eq!(store.get(id).await.unwrap().current_item, 2);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filterable() {
        let store = InMemoryJobStore::new();
        let first = store.create(new_job(JobKind::Fetch, 1)).await.unwrap();
        let second = store.create(new_job(JobKind::Upload, 1)).await.unwrap();
        let third = store.create(new_job(JobKind::Upload, 1)).await.unwrap();
        store
            .update(second, JobUpdate::status(JobStatus::Success))
            .await
            .unwrap();

        let all = store.list(None, 10).await.unwrap();
        assert_eq!(
            all.iter().map(|job| job.id).collect::<Vec<_>>(),
            vec![third, second, first]
        );

        let running = store.list(Some(JobStatus::Running), 10).await.unwrap();
        assert_eq!(
            running.iter().map(|job| job.id).collect::<Vec<_>>(),
            vec![third, first]
        );

        let limited = store.list(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, third);
    }

    #[tokio::test]
    async fn prune_by_length_keeps_newest() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = store.create(new_job(JobKind::Upload, 1)).await.unwrap();
            store
                .update(id, JobUpdate::status(JobStatus::Success))
                .await
                .unwrap();
            ids.push(id);
        }

        let spec = PruneSpec {
            status: JobStatus::Success,
            prune_by: PruneBy::MaxLength(2),
            kinds: crate::pruner::KindSpec::All,
        };
        let removed = store.prune(&spec).await.unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(store.list(None, 10).await.unwrap().len(), 2);
        // The two oldest were removed.
        assert!(removed.contains(&ids[0]));
        assert!(removed.contains(&ids[1]));
    }

    #[tokio::test]
    async fn prune_by_age_ignores_running_jobs() {
        let store = InMemoryJobStore::new();
        let running = store.create(new_job(JobKind::Upload, 1)).await.unwrap();
        let done = store.create(new_job(JobKind::Upload, 1)).await.unwrap();
        store
            .update(done, JobUpdate::status(JobStatus::Success))
            .await
            .unwrap();

        let spec = PruneSpec {
            status: JobStatus::Success,
            prune_by: PruneBy::MaxAge(TimeDelta::zero()),
            kinds: crate::pruner::KindSpec::All,
        };
        // Zero max-age makes everything terminal instantly stale.
        let removed = store.prune(&spec).await.unwrap();

        assert_eq!(removed, vec![done]);
        assert!(store.get(running).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = InMemoryJobStore::new();
        let id = store.create(new_job(JobKind::Fetch, 1)).await.unwrap();

        store.delete(id).await.unwrap();
        assert_matches!(store.get(id).await, Err(StoreError::NotFound(_)));
        assert_matches!(store.delete(id).await, Err(StoreError::NotFound(_)));
    }
}
