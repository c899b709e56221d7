//! Cooperative cancellation signals, keyed by job id.
//!
//! Cancellation is request-then-acknowledge, never preemptive: the worker
//! task is not aborted, because an in-flight platform session must be wound
//! down deterministically. [`CancellationRegistry::request_cancel`] only sets
//! a flag; the job body observes it at its checkpoints (before each item and
//! at every cooldown tick) and transitions itself to `cancelled`.
use std::sync::{Arc, RwLock};

use fxhash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::job::JobId;

/// A keyed map of per-job cancellation tokens.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<RwLock<FxHashMap<JobId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a newly enqueued job and returns the handle the
    /// job body will poll.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut map) = self.inner.write() {
            map.insert(job_id, token.clone());
        }
        token
    }

    /// Sets the cancellation flag for the job. Idempotent; a no-op for jobs
    /// that are unknown or already finished (their entry has been cleared).
    ///
    /// Returns whether a live job was signalled.
    pub fn request_cancel(&self, job_id: JobId) -> bool {
        match self.inner.read().ok().and_then(|map| map.get(&job_id).cloned()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancel_requested(&self, job_id: JobId) -> bool {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(&job_id).map(CancellationToken::is_cancelled))
            .unwrap_or(false)
    }

    /// Drops the job's entry once it reaches a terminal state, bounding
    /// memory growth.
    pub fn clear(&self, job_id: JobId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&job_id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel_flag_round_trip() {
        let registry = CancellationRegistry::new();
        let id = JobId::from(1);
        let token = registry.register(id);

        assert!(!registry.is_cancel_requested(id));
        assert!(!token.is_cancelled());

        assert!(registry.request_cancel(id));
        assert!(registry.is_cancel_requested(id));
        assert!(token.is_cancelled());

        // Requesting again is a harmless no-op.
        assert!(registry.request_cancel(id));
    }

    #[test]
    fn unknown_job_is_a_noop() {
        let registry = CancellationRegistry::new();
        assert!(!registry.request_cancel(JobId::from(42)));
        assert!(!registry.is_cancel_requested(JobId::from(42)));
    }

    #[test]
    fn cleared_job_no_longer_accepts_signals() {
        let registry = CancellationRegistry::new();
        let id = JobId::from(1);
        registry.register(id);
        registry.clear(id);

        assert!(!registry.request_cancel(id));
    }
}
