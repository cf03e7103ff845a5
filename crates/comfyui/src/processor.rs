//! Per-job WebSocket listener.
//!
//! Reads frames off a job's backend connection strictly in arrival
//! order, classifies each one, and applies the outcome to the job.
//! Runs until a terminal event, a connection error, the backend closing
//! the stream, or cancellation. On every exit it closes the socket and
//! makes sure the job reached a terminal state.

use std::ops::ControlFlow;
use std::sync::Arc;

use comfy_sync_core::sink::{artifact_file_name, ArtifactSink};
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::classifier::{classify, Classified, Progress};
use crate::client::ComfyUIStream;
use crate::job::{Job, JobError};

/// Drive one job's event stream to completion.
pub async fn process_messages(
    mut ws_stream: ComfyUIStream,
    job: Arc<Job>,
    sink: Arc<dyn ArtifactSink>,
    cancel: CancellationToken,
) {
    let job_id = job.id();
    job.mark_running();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Listener cancelled");
                break;
            }
            next = ws_stream.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                if handle_message(&message, &job, sink.as_ref()).await.is_break() {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "WebSocket receive error");
                job.fail(JobError::Connection(e.to_string()));
                break;
            }
            None => {
                tracing::info!(job_id = %job_id, "ComfyUI WebSocket stream ended");
                break;
            }
        }
    }

    if let Err(e) = ws_stream.close(None).await {
        tracing::trace!(job_id = %job_id, error = %e, "WebSocket close after listener exit");
    }

    if job.finish_stream() {
        tracing::warn!(job_id = %job_id, "Event stream ended before a terminal event");
    }
}

/// Apply one frame to the job. `Break` ends the listener.
async fn handle_message(
    message: &Message,
    job: &Job,
    sink: &dyn ArtifactSink,
) -> ControlFlow<()> {
    let job_id = job.id();

    match classify(message, job.target_node_id()) {
        Classified::Progress(progress) => {
            log_progress(job, &progress);
            ControlFlow::Continue(())
        }
        Classified::ArtifactReceived(artifact) => {
            tracing::info!(
                job_id = %job_id,
                width = artifact.width,
                height = artifact.height,
                bytes = artifact.png.len(),
                "Received image from ComfyUI",
            );
            job.attach_artifact(artifact, artifact_file_name(&job_id, chrono::Utc::now()));
            ControlFlow::Continue(())
        }
        Classified::DecodeError(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Undecodable binary frame");
            job.record_error(JobError::Decode(e));
            ControlFlow::Continue(())
        }
        Classified::TerminalSuccess => {
            match job.error() {
                Some(error) => {
                    tracing::warn!(
                        job_id = %job_id,
                        error = %error,
                        "Execution finished after an earlier frame failed, not storing image",
                    );
                }
                None => {
                    tracing::info!(job_id = %job_id, "Execution finished successfully");
                    store_artifact(job, sink).await;
                }
            }
            job.complete();
            ControlFlow::Break(())
        }
        Classified::TerminalError(message) => {
            tracing::error!(job_id = %job_id, error = %message, "Execution error");
            job.fail(JobError::Execution(message));
            ControlFlow::Break(())
        }
        Classified::TerminalInterrupted => {
            tracing::info!(job_id = %job_id, "Execution interrupted");
            job.fail(JobError::Interrupted);
            ControlFlow::Break(())
        }
        Classified::Closed => {
            tracing::info!(job_id = %job_id, "ComfyUI closed the WebSocket");
            ControlFlow::Break(())
        }
        Classified::Ignored(reason) => {
            tracing::trace!(job_id = %job_id, reason = %reason, "Ignoring frame");
            ControlFlow::Continue(())
        }
    }
}

/// Hand the final artifact to the sink and record its URL.
///
/// A sink that yields no URL is logged, never fatal.
async fn store_artifact(job: &Job, sink: &dyn ArtifactSink) {
    let Some(stored) = job.artifact() else {
        tracing::warn!(job_id = %job.id(), "Execution finished without an image");
        return;
    };

    match sink.store(&stored.artifact.png, &stored.file_name).await {
        Some(url) => {
            tracing::info!(job_id = %job.id(), sink = sink.kind(), url = %url, "Stored image");
            job.set_result_url(url);
        }
        None => {
            tracing::warn!(
                job_id = %job.id(),
                sink = sink.kind(),
                file_name = %stored.file_name,
                "Image sink returned no URL",
            );
        }
    }
}

fn log_progress(job: &Job, progress: &Progress) {
    let job_id = job.id();
    match progress {
        Progress::Queue { remaining } => {
            tracing::debug!(job_id = %job_id, queue_remaining = remaining, "ComfyUI queue status");
        }
        Progress::Started => {
            tracing::info!(job_id = %job_id, "Execution started");
        }
        Progress::Cached { nodes } => {
            tracing::debug!(job_id = %job_id, cached = nodes.len(), "Execution used cache");
        }
        Progress::Node { node, is_target } => {
            if *is_target {
                tracing::info!(job_id = %job_id, node = %node, "Executing output node");
            } else {
                tracing::debug!(job_id = %job_id, node = %node, "Executing node");
            }
        }
        Progress::Step { value, max } => {
            let percent = if *max > 0 {
                ((*value as f64 / *max as f64) * 100.0) as i16
            } else {
                0
            };
            tracing::debug!(
                job_id = %job_id,
                value,
                max,
                percent,
                "Generation progress",
            );
        }
        Progress::NodeOutput { node } => {
            tracing::debug!(job_id = %job_id, node = %node, "Node executed with output");
        }
    }
}
