use comfy_sync_comfyui::config::BridgeConfig;
use comfy_sync_core::config::env_setting;
use comfy_sync_core::error::ConfigError;
use comfy_sync_storage::StorageConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `600`). Must exceed the
    /// job timeout so jobs fail with their own error first.
    pub request_timeout_secs: u64,
    /// Bound on post-shutdown cleanup in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Backend address and job timeout.
    pub bridge: BridgeConfig,
    /// Artifact sink selection.
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `600`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    ///
    /// Backend and storage settings are read by [`BridgeConfig::from_env`]
    /// and [`StorageConfig::from_env`].
    ///
    /// Fails on a value that is set but unparseable; `main` turns that
    /// into a startup panic.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_setting("PORT", "3000", "a valid u16")?;

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_setting("REQUEST_TIMEOUT_SECS", "600", "a valid u64")?;
        let shutdown_timeout_secs: u64 =
            env_setting("SHUTDOWN_TIMEOUT_SECS", "30", "a valid u64")?;

        let bridge = BridgeConfig::from_env()?;
        let storage = StorageConfig::from_env()?;

        if bridge.job_timeout.as_secs() >= request_timeout_secs {
            tracing::warn!(
                job_timeout_secs = bridge.job_timeout.as_secs(),
                request_timeout_secs,
                "Job timeout is not shorter than the request timeout; \
                 slow jobs will surface as HTTP 408 instead of 504",
            );
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            bridge,
            storage,
        })
    }
}
