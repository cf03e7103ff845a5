//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the WebSocket base URL of the backend.
//! Call [`ComfyUIClient::connect`] with a job's client id to open the
//! job's event stream.

use std::time::Duration;

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Upper bound on the WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The raw WebSocket stream type used for backend connections.
pub type ComfyUIStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the backend's event-stream endpoint.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// Connect to the `/ws` endpoint under `client_id`.
    ///
    /// The backend routes every event for prompts submitted with the
    /// same `client_id` back over this connection.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIStream, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&url))
            .await
            .map_err(|_| {
                ComfyUIClientError::Connection(format!(
                    "Timed out connecting to ComfyUI at {} after {CONNECT_TIMEOUT:?}",
                    self.ws_url
                ))
            })?
            .map_err(|e| {
                ComfyUIClientError::Connection(format!(
                    "Failed to connect to ComfyUI at {}: {e}",
                    self.ws_url
                ))
            })?;

        tracing::debug!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ws_stream)
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
