use std::time::Duration;

use comfy_sync_core::config::env_setting;
use comfy_sync_core::error::ConfigError;

/// Base URLs of the backend's two endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoints {
    /// Event stream base, e.g. `ws://host:8188`.
    pub ws_base: String,
    /// Command API base, e.g. `http://host:8188`.
    pub http_base: String,
}

impl BackendEndpoints {
    /// Derive both base URLs from one server address.
    ///
    /// Accepts a bare `host:port` (plain `ws`/`http`) or a URL with an
    /// `http`, `https`, `ws` or `wss` scheme; TLS carries over to both.
    pub fn from_server(server: &str) -> Self {
        let server = server.trim().trim_end_matches('/');

        let (tls, authority) = if let Some(rest) = server.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = server.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = server.strip_prefix("http://") {
            (false, rest)
        } else if let Some(rest) = server.strip_prefix("ws://") {
            (false, rest)
        } else {
            (false, server)
        };

        let (ws, http) = if tls { ("wss", "https") } else { ("ws", "http") };
        Self {
            ws_base: format!("{ws}://{authority}"),
            http_base: format!("{http}://{authority}"),
        }
    }
}

/// Backend bridge configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoints: BackendEndpoints,
    /// Bounded wait on a job's completion signal.
    pub job_timeout: Duration,
}

impl BridgeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default          |
    /// |--------------------|------------------|
    /// | `COMFYUI_SERVER`   | `127.0.0.1:8188` |
    /// | `JOB_TIMEOUT_SECS` | `300`            |
    ///
    /// Fails on a value that is set but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = std::env::var("COMFYUI_SERVER").unwrap_or_else(|_| "127.0.0.1:8188".into());
        let job_timeout_secs: u64 = env_setting("JOB_TIMEOUT_SECS", "300", "a valid u64")?;

        Ok(Self {
            endpoints: BackendEndpoints::from_server(&server),
            job_timeout: Duration::from_secs(job_timeout_secs),
        })
    }
}
