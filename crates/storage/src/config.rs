use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use comfy_sync_core::config::parse_setting;
use comfy_sync_core::error::ConfigError;

/// Longest validity SigV4 allows for a presigned URL. Longer windows
/// (e.g. 30 days) cannot be issued by S3-compatible stores.
pub const MAX_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Object key namespace used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "comfy_images/";

/// Connection details for an S3-compatible bucket.
#[derive(Clone)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Prepended verbatim to every object key.
    pub key_prefix: String,
    /// Validity of returned URLs, at most [`MAX_URL_EXPIRY`].
    pub url_expiry: Duration,
    /// Address buckets as `<endpoint>/<bucket>` instead of by subdomain.
    pub path_style: bool,
}

impl fmt::Debug for ObjectStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("key_prefix", &self.key_prefix)
            .field("url_expiry", &self.url_expiry)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `None` means local serving only.
    pub object_storage: Option<ObjectStorageConfig>,
    /// Externally visible base URL for locally served images.
    pub base_url: Option<String>,
    /// Directory local images are written to.
    pub output_dir: PathBuf,
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default          |
    /// |------------------------------------|------------------|
    /// | `OBJECT_STORAGE_ENABLED`           | `false`          |
    /// | `OBJECT_STORAGE_ENDPOINT`          | (required)       |
    /// | `OBJECT_STORAGE_REGION`            | `us-east-1`      |
    /// | `OBJECT_STORAGE_BUCKET`            | (required)       |
    /// | `OBJECT_STORAGE_ACCESS_KEY_ID`     | (required)       |
    /// | `OBJECT_STORAGE_SECRET_ACCESS_KEY` | (required)       |
    /// | `OBJECT_STORAGE_KEY_PREFIX`        | `comfy_images/`  |
    /// | `OBJECT_STORAGE_URL_EXPIRY_SECS`   | `604800`         |
    /// | `OBJECT_STORAGE_PATH_STYLE`        | `false`          |
    /// | `SERVER_BASE_URL`                  | (empty)          |
    /// | `OUTPUT_DIR`                       | `output_images`  |
    ///
    /// Enabling object storage without the required values logs a
    /// warning and falls back to local serving. A value that is set but
    /// unparseable is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let object_storage = if var("OBJECT_STORAGE_ENABLED").is_some_and(|v| parse_flag(&v)) {
            object_storage_from(&var)?
        } else {
            None
        };

        let base_url = var("SERVER_BASE_URL").map(|url| url.trim_end_matches('/').to_string());
        let output_dir = PathBuf::from(var("OUTPUT_DIR").unwrap_or_else(|| "output_images".into()));

        Ok(Self {
            object_storage,
            base_url,
            output_dir,
        })
    }

    /// Label for health reporting.
    pub fn backend_name(&self) -> &'static str {
        if self.object_storage.is_some() {
            "object_storage"
        } else {
            "local"
        }
    }
}

fn object_storage_from<F>(var: &F) -> Result<Option<ObjectStorageConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let endpoint = var("OBJECT_STORAGE_ENDPOINT");
    let bucket = var("OBJECT_STORAGE_BUCKET");
    let access_key_id = var("OBJECT_STORAGE_ACCESS_KEY_ID");
    let secret_access_key = var("OBJECT_STORAGE_SECRET_ACCESS_KEY");

    let (Some(endpoint), Some(bucket), Some(access_key_id), Some(secret_access_key)) =
        (endpoint, bucket, access_key_id, secret_access_key)
    else {
        tracing::warn!(
            "OBJECT_STORAGE_ENABLED is set but endpoint, bucket or credentials are missing; \
             using local storage only"
        );
        return Ok(None);
    };

    let expiry_secs: u64 = match var("OBJECT_STORAGE_URL_EXPIRY_SECS") {
        Some(value) => parse_setting("OBJECT_STORAGE_URL_EXPIRY_SECS", &value, "a valid u64")?,
        None => MAX_URL_EXPIRY.as_secs(),
    };

    Ok(Some(ObjectStorageConfig {
        endpoint: endpoint.trim_end_matches('/').to_string(),
        region: var("OBJECT_STORAGE_REGION").unwrap_or_else(|| "us-east-1".into()),
        bucket,
        access_key_id,
        secret_access_key,
        key_prefix: var("OBJECT_STORAGE_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.into()),
        url_expiry: clamp_expiry(Duration::from_secs(expiry_secs)),
        path_style: var("OBJECT_STORAGE_PATH_STYLE").is_some_and(|v| parse_flag(&v)),
    }))
}

/// Keep a URL validity within what presigning accepts.
pub fn clamp_expiry(requested: Duration) -> Duration {
    if requested > MAX_URL_EXPIRY {
        tracing::warn!(
            requested_secs = requested.as_secs(),
            max_secs = MAX_URL_EXPIRY.as_secs(),
            "Presigned URL expiry exceeds the signing limit, clamping",
        );
        MAX_URL_EXPIRY
    } else {
        requested.max(Duration::from_secs(1))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
