//! Per-job state.
//!
//! A [`Job`] is shared between the listener task that drives it and the
//! caller waiting on it. All mutation goes through the methods here so
//! the terminal transition and the completion signal happen at most once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use comfy_sync_core::types::{JobId, ResponseKind};
use tokio::sync::oneshot;

use crate::frame::{Artifact, FrameError};

/// What the caller asked the backend to run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// The workflow graph, forwarded verbatim as the backend `prompt`.
    pub workflow: serde_json::Value,
    /// Node whose output image the caller wants.
    pub target_node_id: i64,
    pub response_kind: ResponseKind,
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Registered, event stream not attached yet.
    Pending,
    /// Event stream attached, waiting for a terminal event.
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Every way a job can fail, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The backend rejected or never received the job.
    #[error("Failed to submit job to backend: {0}")]
    Submission(String),

    /// The event stream could not be opened or dropped mid-job.
    #[error("Backend connection error: {0}")]
    Connection(String),

    /// The backend reported an execution failure.
    #[error("Backend execution failed: {0}")]
    Execution(String),

    /// Execution was cancelled on the backend.
    #[error("Backend execution was interrupted")]
    Interrupted,

    /// A received binary payload was not a valid image.
    #[error("Failed to decode image from backend: {0}")]
    Decode(#[from] FrameError),

    /// No terminal event arrived within the wait bound.
    #[error("Job did not finish within {0:?}")]
    Timeout(Duration),

    /// Execution finished but no image was ever received.
    #[error("Execution finished without producing an image")]
    NoArtifact,

    /// An image was produced but storing it yielded no retrievable URL.
    #[error("Image was produced but no retrievable URL is available")]
    NoUrl,
}

/// The stored result image of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub artifact: Artifact,
    /// File name the artifact was stored under.
    pub file_name: String,
}

/// Immutable copy of a job's state, taken after it finished.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub target_node_id: i64,
    pub response_kind: ResponseKind,
    pub prompt_id: Option<String>,
    pub artifact: Option<StoredArtifact>,
    pub result_url: Option<String>,
    pub error: Option<JobError>,
}

struct JobInner {
    state: JobState,
    prompt_id: Option<String>,
    artifact: Option<StoredArtifact>,
    result_url: Option<String>,
    error: Option<JobError>,
    completion: Option<oneshot::Sender<()>>,
}

/// One in-flight generation job.
pub struct Job {
    id: JobId,
    target_node_id: i64,
    response_kind: ResponseKind,
    inner: Mutex<JobInner>,
}

impl Job {
    /// Create a pending job plus the receiving half of its completion signal.
    pub fn new(id: JobId, request: &JobRequest) -> (Arc<Self>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            id,
            target_node_id: request.target_node_id,
            response_kind: request.response_kind,
            inner: Mutex::new(JobInner {
                state: JobState::Pending,
                prompt_id: None,
                artifact: None,
                result_url: None,
                error: None,
                completion: Some(tx),
            }),
        };
        (Arc::new(job), rx)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn target_node_id(&self) -> i64 {
        self.target_node_id
    }

    /// `Pending -> Running`. No-op in any other state.
    pub fn mark_running(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != JobState::Pending {
            return false;
        }
        inner.state = JobState::Running;
        true
    }

    pub fn set_prompt_id(&self, prompt_id: String) {
        self.lock().prompt_id = Some(prompt_id);
    }

    pub fn prompt_id(&self) -> Option<String> {
        self.lock().prompt_id.clone()
    }

    /// Record an error. The first error wins; later ones are only logged.
    pub fn record_error(&self, error: JobError) -> bool {
        let mut inner = self.lock();
        Self::record_error_locked(self.id, &mut inner, error)
    }

    /// Keep the latest decoded image under `file_name`. Earlier frames
    /// (e.g. sampler previews) are superseded.
    pub fn attach_artifact(&self, artifact: Artifact, file_name: String) {
        let mut inner = self.lock();
        if inner.artifact.is_some() {
            tracing::debug!(job_id = %self.id, "Replacing earlier artifact with newer frame");
        }
        inner.artifact = Some(StoredArtifact {
            artifact,
            file_name,
        });
        inner.result_url = None;
    }

    /// Copy of the current artifact, if any.
    pub fn artifact(&self) -> Option<StoredArtifact> {
        self.lock().artifact.clone()
    }

    pub fn set_result_url(&self, url: String) {
        self.lock().result_url = Some(url);
    }

    /// The first error recorded so far.
    pub fn error(&self) -> Option<JobError> {
        self.lock().error.clone()
    }

    /// Finish a job whose execution succeeded and fire the completion
    /// signal.
    ///
    /// A job that already recorded an error (e.g. an undecodable frame)
    /// ends `Failed` with that error, even if a later frame was valid.
    /// Returns `false` if the job was already terminal.
    pub fn complete(&self) -> bool {
        let mut inner = self.lock();
        let state = if inner.error.is_some() {
            JobState::Failed
        } else {
            JobState::Completed
        };
        self.finish_locked(&mut inner, state)
    }

    /// Record `error` (first wins) and transition to `Failed`.
    ///
    /// Returns `false` if the job was already terminal.
    pub fn fail(&self, error: JobError) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            tracing::debug!(job_id = %self.id, error = %error, "Ignoring failure on finished job");
            return false;
        }
        Self::record_error_locked(self.id, &mut inner, error);
        self.finish_locked(&mut inner, JobState::Failed)
    }

    /// Finalise the job once its event stream is gone.
    ///
    /// A stream that ends without a terminal event fails the job with
    /// whatever error was recorded so far, or a connection error.
    pub fn finish_stream(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        if inner.error.is_none() {
            inner.error = Some(JobError::Connection(
                "event stream closed before execution finished".to_string(),
            ));
        }
        self.finish_locked(&mut inner, JobState::Failed)
    }

    /// Copy the current state out for the response layer.
    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.lock();
        JobSnapshot {
            id: self.id,
            state: inner.state,
            target_node_id: self.target_node_id,
            response_kind: self.response_kind,
            prompt_id: inner.prompt_id.clone(),
            artifact: inner.artifact.clone(),
            result_url: inner.result_url.clone(),
            error: inner.error.clone(),
        }
    }

    // ---- private helpers ----

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error_locked(id: JobId, inner: &mut JobInner, error: JobError) -> bool {
        match &inner.error {
            Some(existing) => {
                tracing::warn!(
                    job_id = %id,
                    existing = %existing,
                    ignored = %error,
                    "Job already has an error, keeping the first",
                );
                false
            }
            None => {
                inner.error = Some(error);
                true
            }
        }
    }

    fn finish_locked(&self, inner: &mut JobInner, state: JobState) -> bool {
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = state;
        if let Some(tx) = inner.completion.take() {
            // The waiter may already be gone (caller dropped); nothing to do then.
            let _ = tx.send(());
        }
        tracing::debug!(job_id = %self.id, state = ?state, "Job reached terminal state");
        true
    }
}
