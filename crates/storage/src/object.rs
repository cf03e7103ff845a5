//! Durable object storage sink.
//!
//! Uploads each artifact to an S3-compatible bucket under the configured
//! key prefix and hands back a presigned `GET` URL. Every failure is
//! logged and reported as "no URL".

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use comfy_sync_core::sink::{ArtifactSink, ARTIFACT_CONTENT_TYPE};

use crate::config::ObjectStorageConfig;
use crate::error::StorageError;

/// Provider name attached to the static credentials.
const CREDENTIALS_PROVIDER: &str = "comfy-sync-env";

pub struct ObjectStorageSink {
    client: aws_sdk_s3::Client,
    bucket: String,
    key_prefix: String,
    url_expiry: Duration,
}

impl ObjectStorageSink {
    /// Build a client for the configured endpoint with static credentials.
    pub async fn new(config: &ObjectStorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(config.endpoint.clone())
            .force_path_style(config.path_style)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
            url_expiry: config.url_expiry,
        }
    }

    /// Key an artifact named `file_name` is stored under.
    pub fn object_key(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.key_prefix)
    }

    /// Presigned `GET` URL for `key`, valid for the configured window.
    pub async fn presigned_url(&self, key: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(self.url_expiry)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn upload(&self, bytes: &[u8], key: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(ARTIFACT_CONTENT_TYPE)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for ObjectStorageSink {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Option<String> {
        let key = self.object_key(suggested_name);

        let result = match self.upload(bytes, &key).await {
            Ok(()) => self.presigned_url(&key).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(url) => {
                tracing::debug!(
                    bucket = %self.bucket,
                    key = %key,
                    "Image uploaded to object storage",
                );
                Some(url)
            }
            Err(e) => {
                tracing::warn!(
                    bucket = %self.bucket,
                    key = %key,
                    error = %e,
                    "Object storage failed",
                );
                None
            }
        }
    }

    fn kind(&self) -> &'static str {
        "object_storage"
    }
}
