//! Artifact sink contract.
//!
//! A sink stores the bytes of a finished job's image and hands back a
//! URL the caller can fetch it from. Implementations live in the
//! storage crate; the bridge only sees this trait.

use async_trait::async_trait;

use crate::types::{JobId, Timestamp};

/// Extension used for every stored artifact (images are normalised to PNG).
pub const ARTIFACT_EXTENSION: &str = "png";

/// Content type of every stored artifact.
pub const ARTIFACT_CONTENT_TYPE: &str = "image/png";

/// Stores a binary artifact and returns a retrievable URL.
///
/// `store` never fails past its contract: any storage problem is logged
/// by the implementation and reported as `None` ("no URL"), so a sink
/// failure can never abort the job that produced the artifact.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `bytes` under (a name derived from) `suggested_name`.
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Option<String>;

    /// Short label for logs and health output (`"local"`, `"object_storage"`).
    fn kind(&self) -> &'static str;
}

/// Build the artifact file name for a job.
///
/// The job id makes the name unique even when many jobs finish within
/// the same second; the timestamp keeps directory listings sortable.
pub fn artifact_file_name(job_id: &JobId, now: Timestamp) -> String {
    format!(
        "comfy_{}_{}.{ARTIFACT_EXTENSION}",
        now.format("%Y%m%d%H%M%S"),
        job_id.as_uuid().simple(),
    )
}
