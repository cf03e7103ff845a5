use std::sync::Arc;

use comfy_sync_comfyui::coordinator::JobCoordinator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Bridge to the ComfyUI backend; owns the job registry and sink.
    pub coordinator: Arc<JobCoordinator>,
}
