use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use comfy_sync_comfyui::job::JobError;
use comfy_sync_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for request validation and [`JobError`] for job
/// failures, plus a variant for unreadable request bodies. Implements
/// [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `comfy_sync_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job that failed, or finished without the requested result.
    #[error(transparent)]
    Job(#[from] JobError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }

            // --- Job failures ---
            AppError::Job(err) => {
                let (status, code) = classify_job_error(err);
                tracing::warn!(error = %err, code, "Job failed");
                (status, code, err.to_string())
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a job failure to an HTTP status and error code.
///
/// Backend reachability problems are gateway errors; everything the
/// backend reported or produced is a 500 with the job's message.
fn classify_job_error(err: &JobError) -> (StatusCode, &'static str) {
    match err {
        JobError::Submission(_) | JobError::Connection(_) => {
            (StatusCode::BAD_GATEWAY, "BACKEND_UNAVAILABLE")
        }
        JobError::Execution(_) => (StatusCode::INTERNAL_SERVER_ERROR, "EXECUTION_ERROR"),
        JobError::Interrupted => (StatusCode::INTERNAL_SERVER_ERROR, "INTERRUPTED"),
        JobError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        JobError::Decode(_) | JobError::NoArtifact => {
            (StatusCode::INTERNAL_SERVER_ERROR, "NO_ARTIFACT")
        }
        JobError::NoUrl => (StatusCode::INTERNAL_SERVER_ERROR, "NO_URL"),
    }
}
