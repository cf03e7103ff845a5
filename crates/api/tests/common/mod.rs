#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use comfy_sync_api::config::ServerConfig;
use comfy_sync_api::router::build_app_router;
use comfy_sync_api::state::AppState;
use comfy_sync_comfyui::config::{BackendEndpoints, BridgeConfig};
use comfy_sync_comfyui::coordinator::JobCoordinator;
use comfy_sync_comfyui::registry::JobRegistry;
use comfy_sync_core::sink::ArtifactSink;
use comfy_sync_storage::StorageConfig;
use http_body_util::BodyExt;
use tower::ServiceExt;

#[path = "../../../comfyui/tests/common/mod.rs"]
pub mod fake;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and a short job timeout.
pub fn test_config(server: &str, output_dir: &Path, job_timeout: Duration) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        bridge: BridgeConfig {
            endpoints: BackendEndpoints::from_server(server),
            job_timeout,
        },
        storage: StorageConfig {
            object_storage: None,
            base_url: None,
            output_dir: output_dir.to_path_buf(),
        },
    }
}

/// A router wired to a backend at `server`, plus its registry.
pub struct TestApp {
    pub router: Router,
    pub registry: Arc<JobRegistry>,
}

/// Build the full application router with all middleware layers.
///
/// Uses the same [`build_app_router`] as `main.rs` so integration tests
/// exercise the production middleware stack.
pub fn build_test_app(
    server: &str,
    sink: Arc<dyn ArtifactSink>,
    output_dir: &Path,
    job_timeout: Duration,
) -> TestApp {
    let config = test_config(server, output_dir, job_timeout);
    let registry = Arc::new(JobRegistry::new());
    let coordinator = Arc::new(JobCoordinator::new(
        &config.bridge,
        Arc::clone(&registry),
        sink,
    ));

    let state = AppState { coordinator };

    TestApp {
        router: build_app_router(state, &config),
        registry,
    }
}

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

/// Send a POST request with a raw body declared as JSON.
pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body as bytes.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
