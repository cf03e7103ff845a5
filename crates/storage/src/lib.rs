//! Artifact sinks: where finished images go.
//!
//! Two implementations of [`ArtifactSink`] are provided, selected from
//! [`StorageConfig`] at startup:
//!
//! - [`LocalSink`] writes into the output directory served under
//!   `/output_images`.
//! - [`ObjectStorageSink`] uploads to an S3-compatible bucket and returns
//!   a presigned, time-limited URL.
//!
//! When object storage is configured it is wrapped in a [`FallbackSink`]
//! so a failed upload still yields a locally served URL.

pub mod config;
pub mod error;
pub mod fallback;
pub mod local;
pub mod object;

use std::sync::Arc;

use comfy_sync_core::sink::ArtifactSink;

pub use config::{ObjectStorageConfig, StorageConfig};
pub use error::StorageError;
pub use fallback::FallbackSink;
pub use local::LocalSink;
pub use object::ObjectStorageSink;

/// Build the sink chain described by `config`.
pub async fn build_sink(config: &StorageConfig) -> Arc<dyn ArtifactSink> {
    let local = Arc::new(LocalSink::new(
        config.output_dir.clone(),
        config.base_url.clone(),
    ));

    match &config.object_storage {
        Some(object_config) => {
            let object = ObjectStorageSink::new(object_config).await;
            tracing::info!(
                bucket = %object_config.bucket,
                endpoint = %object_config.endpoint,
                "Object storage enabled with local fallback",
            );
            Arc::new(FallbackSink::new(Arc::new(object), local))
        }
        None => {
            tracing::info!(output_dir = %config.output_dir.display(), "Serving images locally");
            local
        }
    }
}
