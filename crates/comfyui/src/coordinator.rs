//! Job coordinator: the synchronous face of the asynchronous backend.
//!
//! [`JobCoordinator::submit`] registers a job, opens its event stream,
//! spawns the listener task, and posts the workflow. The returned
//! [`PendingJob`] is awaited once; the listener wakes it through the
//! job's one-shot completion signal.
//!
//! Cleanup is tied to the [`RegistrationGuard`] held by the pending
//! job: however the request ends (result, error, timeout, or the caller
//! dropping the future) the registry entry is removed and the listener
//! is cancelled, which closes the backend connection.

use std::sync::Arc;
use std::time::Duration;

use comfy_sync_core::sink::ArtifactSink;
use comfy_sync_core::types::JobId;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;
use crate::client::ComfyUIClient;
use crate::config::BridgeConfig;
use crate::job::{Job, JobError, JobRequest, JobSnapshot, JobState};
use crate::processor::process_messages;
use crate::registry::{JobRegistry, RegistrationGuard};

/// How long to wait for a cancelled listener to close its socket.
const LISTENER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bridges synchronous callers to the push-based backend.
///
/// Created once at application startup. Shared via `Arc` into request
/// handlers; every job it starts is independent of the others.
pub struct JobCoordinator {
    api: ComfyUIApi,
    client: ComfyUIClient,
    registry: Arc<JobRegistry>,
    sink: Arc<dyn ArtifactSink>,
    job_timeout: Duration,
}

/// A submitted job whose result has not been collected yet.
///
/// Dropping it without calling [`wait`](Self::wait) still releases the
/// connection and the registry entry.
pub struct PendingJob {
    job: Arc<Job>,
    completion: oneshot::Receiver<()>,
    listener: JoinHandle<()>,
    api: ComfyUIApi,
    guard: RegistrationGuard,
}

impl std::fmt::Debug for PendingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingJob")
            .field("job_id", &self.guard.job_id())
            .finish_non_exhaustive()
    }
}

impl JobCoordinator {
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<JobRegistry>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            api: ComfyUIApi::new(config.endpoints.http_base.clone()),
            client: ComfyUIClient::new(config.endpoints.ws_base.clone()),
            registry,
            sink,
            job_timeout: config.job_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Label of the configured artifact sink.
    pub fn sink_kind(&self) -> &'static str {
        self.sink.kind()
    }

    /// Start a job and return a handle to await it.
    ///
    /// Connection and submission failures are returned immediately;
    /// the guard inside the (dropped) pending job cleans up after them.
    pub async fn submit(&self, request: JobRequest) -> Result<PendingJob, JobError> {
        let id = JobId::new();
        let client_id = id.to_string();
        let (job, completion) = Job::new(id, &request);

        // Register before any I/O so early events always find the job.
        let cancel = CancellationToken::new();
        let guard = self.registry.register(Arc::clone(&job), cancel.clone());

        tracing::info!(
            job_id = %id,
            target_node_id = request.target_node_id,
            response_kind = request.response_kind.as_str(),
            "Job registered",
        );

        let ws_stream = match self.client.connect(&client_id).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to open event stream");
                let error = JobError::Connection(e.to_string());
                job.fail(error.clone());
                return Err(error);
            }
        };

        let listener = tokio::spawn(process_messages(
            ws_stream,
            Arc::clone(&job),
            Arc::clone(&self.sink),
            cancel,
        ));

        let pending = PendingJob {
            job,
            completion,
            listener,
            api: self.api.clone(),
            guard,
        };

        match self.api.submit_workflow(&request.workflow, &client_id).await {
            Ok(response) => {
                tracing::info!(
                    job_id = %id,
                    prompt_id = %response.prompt_id,
                    queue_position = response.number,
                    "Workflow submitted to ComfyUI",
                );
                if has_node_errors(&response.node_errors) {
                    tracing::warn!(
                        job_id = %id,
                        node_errors = %response.node_errors,
                        "ComfyUI accepted workflow with node errors",
                    );
                }
                pending.job.set_prompt_id(response.prompt_id);
                Ok(pending)
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to submit workflow");
                let error = JobError::Submission(e.to_string());
                pending.job.fail(error.clone());
                pending.shutdown().await;
                Err(error)
            }
        }
    }

    /// Submit a job and wait for it with the configured timeout.
    pub async fn run(&self, request: JobRequest) -> Result<JobSnapshot, JobError> {
        self.submit(request)
            .await?
            .wait(Some(self.job_timeout))
            .await
    }
}

impl PendingJob {
    pub fn id(&self) -> JobId {
        self.guard.job_id()
    }

    /// Block until the job reaches a terminal state, or `timeout` passes.
    ///
    /// Returns the finished snapshot for a completed job and the job's
    /// first recorded error otherwise. The registry entry is gone and
    /// the connection released by the time this returns.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<JobSnapshot, JobError> {
        let id = self.id();

        let signalled = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.completion)
                .await
                .map_err(|_| limit),
            None => Ok((&mut self.completion).await),
        };

        match signalled {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                // The sender lives inside the job until its terminal
                // transition, so this only happens if that invariant breaks.
                self.job.fail(JobError::Connection(
                    "completion signal dropped before the job finished".to_string(),
                ));
            }
            Err(limit) => {
                if self.job.fail(JobError::Timeout(limit)) {
                    tracing::warn!(job_id = %id, timeout = ?limit, "Job timed out");
                    self.remove_queued_prompt();
                }
            }
        }

        let job = Arc::clone(&self.job);
        self.shutdown().await;

        let snapshot = job.snapshot();
        match snapshot.state {
            JobState::Completed => Ok(snapshot),
            _ => Err(snapshot.error.unwrap_or_else(|| {
                JobError::Connection("job ended without a result".to_string())
            })),
        }
    }

    /// Release the registry entry and stop the listener.
    async fn shutdown(self) {
        let Self {
            guard, listener, ..
        } = self;
        drop(guard);
        if tokio::time::timeout(LISTENER_SHUTDOWN_GRACE, listener)
            .await
            .is_err()
        {
            tracing::warn!("Listener did not stop within {LISTENER_SHUTDOWN_GRACE:?}");
        }
    }

    /// Best-effort removal of an abandoned prompt from the backend queue.
    fn remove_queued_prompt(&self) {
        let Some(prompt_id) = self.job.prompt_id() else {
            return;
        };
        let api = self.api.clone();
        let job_id = self.id();
        tokio::spawn(async move {
            if let Err(e) = api.cancel_execution(&prompt_id).await {
                tracing::warn!(
                    job_id = %job_id,
                    prompt_id = %prompt_id,
                    error = %e,
                    "Failed to remove timed-out prompt",
                );
            }
        });
    }
}

fn has_node_errors(node_errors: &serde_json::Value) -> bool {
    match node_errors {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => !map.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}
