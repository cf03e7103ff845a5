//! Response adapter.
//!
//! Turns a finished job into the caller's requested encoding: a
//! `{ "url": ... }` payload, or the PNG bytes with metadata headers.

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use comfy_sync_comfyui::job::{JobError, JobSnapshot, StoredArtifact};
use comfy_sync_core::sink::ARTIFACT_CONTENT_TYPE;
use comfy_sync_core::types::ResponseKind;
use serde::Serialize;

/// Header carrying the best-effort URL of a file response.
pub const IMAGE_URL_HEADER: &str = "x-image-url";

/// Header carrying the job id.
pub const JOB_ID_HEADER: &str = "x-job-id";

/// Body of a URL-mode response.
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

/// Encode `snapshot` according to its response kind.
pub fn respond(snapshot: JobSnapshot) -> Result<Response, JobError> {
    match snapshot.response_kind {
        ResponseKind::Url => url_payload(&snapshot).map(|body| Json(body).into_response()),
        ResponseKind::File => file_response(snapshot),
    }
}

/// URL mode: requires a stored URL.
///
/// An image without a URL is [`JobError::NoUrl`], distinct from having
/// no image at all.
pub fn url_payload(snapshot: &JobSnapshot) -> Result<UrlResponse, JobError> {
    match (&snapshot.result_url, &snapshot.artifact) {
        (Some(url), _) => Ok(UrlResponse { url: url.clone() }),
        (None, Some(_)) => Err(JobError::NoUrl),
        (None, None) => Err(JobError::NoArtifact),
    }
}

/// File mode: requires the image bytes; the URL header is best-effort.
pub fn file_response(snapshot: JobSnapshot) -> Result<Response, JobError> {
    let Some(StoredArtifact {
        artifact,
        file_name,
    }) = snapshot.artifact.clone()
    else {
        return Err(JobError::NoArtifact);
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ARTIFACT_CONTENT_TYPE));
    insert_header(
        &mut headers,
        CONTENT_DISPOSITION,
        &format!("attachment; filename=\"{file_name}\""),
    );
    insert_header(
        &mut headers,
        HeaderName::from_static(JOB_ID_HEADER),
        &snapshot.id.to_string(),
    );
    if let Some(url) = &snapshot.result_url {
        insert_header(&mut headers, HeaderName::from_static(IMAGE_URL_HEADER), url);
    }

    Ok((headers, artifact.png).into_response())
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => {
            tracing::warn!(header = %name, error = %e, "Skipping header with invalid value");
        }
    }
}
