//! Registry of in-flight jobs.
//!
//! Process-wide, but populated strictly per request: an entry exists
//! only while its [`RegistrationGuard`] is alive. Dropping the guard
//! removes the entry and cancels the job's listener, on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use comfy_sync_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::job::Job;

/// Concurrency-safe map from job id to job state.
///
/// Designed to be wrapped in `Arc` and shared between the coordinator
/// and the HTTP layer (e.g. for health reporting).
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl JobRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` and return the guard that owns its entry.
    ///
    /// The registry holds the job for as long as the guard lives, which
    /// is what keeps an in-flight job counted by [`len`](Self::len).
    ///
    /// `cancel` is fired when the guard drops so the job's listener
    /// releases its connection.
    pub fn register(
        self: &Arc<Self>,
        job: Arc<Job>,
        cancel: CancellationToken,
    ) -> RegistrationGuard {
        let id = job.id();
        let previous = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job);
        if previous.is_some() {
            tracing::warn!(job_id = %id, "Job id collision, replaced existing registry entry");
        }

        RegistrationGuard {
            registry: Arc::clone(self),
            id,
            cancel,
        }
    }

    /// Number of in-flight jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

/// Owns one registry entry for the duration of a request.
pub struct RegistrationGuard {
    registry: Arc<JobRegistry>,
    id: JobId,
    cancel: CancellationToken,
}

impl RegistrationGuard {
    pub fn job_id(&self) -> JobId {
        self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        if self.registry.remove(&self.id).is_some() {
            tracing::debug!(job_id = %self.id, "Job removed from registry");
        }
    }
}

#[cfg(test)]
mod tests {
    use comfy_sync_core::types::ResponseKind;

    use super::*;
    use crate::job::JobRequest;

    fn job() -> Arc<Job> {
        let request = JobRequest {
            workflow: serde_json::json!({}),
            target_node_id: 1,
            response_kind: ResponseKind::File,
        };
        Job::new(JobId::new(), &request).0
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = JobRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn guard_owns_the_entry() {
        let registry = Arc::new(JobRegistry::new());
        let job = job();
        let id = job.id();

        let guard = registry.register(job, CancellationToken::new());
        assert_eq!(registry.len(), 1);
        assert_eq!(guard.job_id(), id);

        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_guard_cancels_listener_token() {
        let registry = Arc::new(JobRegistry::new());
        let cancel = CancellationToken::new();

        let guard = registry.register(job(), cancel.clone());
        assert!(!cancel.is_cancelled());

        drop(guard);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn entries_are_independent() {
        let registry = Arc::new(JobRegistry::new());
        let a = registry.register(job(), CancellationToken::new());
        let b = registry.register(job(), CancellationToken::new());
        assert_eq!(registry.len(), 2);

        drop(a);
        assert_eq!(registry.len(), 1);

        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration_from_threads() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let guard = registry.register(job(), CancellationToken::new());
                        assert!(!registry.is_empty());
                        drop(guard);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
