//! Local-serving sink.
//!
//! Writes artifacts into the output directory that the HTTP layer
//! exposes under [`OUTPUT_ROUTE`].

use std::path::PathBuf;

use async_trait::async_trait;
use comfy_sync_core::sink::ArtifactSink;

use crate::error::StorageError;

/// URL path the output directory is served under.
pub const OUTPUT_ROUTE: &str = "/output_images";

#[derive(Debug, Clone)]
pub struct LocalSink {
    output_dir: PathBuf,
    base_url: Option<String>,
}

impl LocalSink {
    /// * `base_url` - externally visible origin; without it URLs are
    ///   root-relative paths.
    pub fn new(output_dir: PathBuf, base_url: Option<String>) -> Self {
        Self {
            output_dir,
            base_url,
        }
    }

    /// URL a stored file is reachable at.
    pub fn url_for(&self, file_name: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}{OUTPUT_ROUTE}/{file_name}"),
            None => format!("{OUTPUT_ROUTE}/{file_name}"),
        }
    }

    async fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StorageError> {
        let file_name = sanitize_name(suggested_name)?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(self.output_dir.join(file_name), bytes).await?;
        Ok(file_name.to_string())
    }
}

#[async_trait]
impl ArtifactSink for LocalSink {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Option<String> {
        match self.write(bytes, suggested_name).await {
            Ok(file_name) => {
                tracing::debug!(file_name = %file_name, bytes = bytes.len(), "Image saved locally");
                Some(self.url_for(&file_name))
            }
            Err(e) => {
                tracing::warn!(
                    output_dir = %self.output_dir.display(),
                    file_name = %suggested_name,
                    error = %e,
                    "Failed to save image locally",
                );
                None
            }
        }
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

/// Accept only a bare file name; anything that could escape the output
/// directory is rejected.
fn sanitize_name(name: &str) -> Result<&str, StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if valid {
        Ok(name)
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
