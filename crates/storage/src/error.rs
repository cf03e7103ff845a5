use std::io;

/// Failures inside a sink. Never crosses the [`ArtifactSink`] boundary:
/// sinks log these and report "no URL" instead.
///
/// [`ArtifactSink`]: comfy_sync_core::sink::ArtifactSink
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("Filesystem error: {0}")]
    Io(#[from] io::Error),

    #[error("Object upload failed: {0}")]
    Upload(String),

    #[error("Failed to presign object URL: {0}")]
    Presign(String),
}
