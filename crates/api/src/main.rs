use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use comfy_sync_api::config::ServerConfig;
use comfy_sync_api::router::build_app_router;
use comfy_sync_api::state::AppState;
use comfy_sync_comfyui::coordinator::JobCoordinator;
use comfy_sync_comfyui::registry::JobRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "comfy_sync_api=debug,comfy_sync_comfyui=debug,comfy_sync_storage=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config =
        ServerConfig::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        ws = %config.bridge.endpoints.ws_base,
        http = %config.bridge.endpoints.http_base,
        job_timeout = ?config.bridge.job_timeout,
        "ComfyUI backend configured",
    );

    tracing::info!(
        backend = config.storage.backend_name(),
        output_dir = %config.storage.output_dir.display(),
        "Artifact storage configured",
    );

    // --- Output directory ---
    tokio::fs::create_dir_all(&config.storage.output_dir)
        .await
        .expect("Failed to create output directory");

    // --- Artifact sink ---
    let sink = comfy_sync_storage::build_sink(&config.storage).await;

    // --- Job coordinator ---
    let registry = Arc::new(JobRegistry::new());
    let coordinator = Arc::new(JobCoordinator::new(
        &config.bridge,
        Arc::clone(&registry),
        sink,
    ));
    tracing::info!(storage = coordinator.sink_kind(), "Job coordinator ready");

    // --- App state ---
    let state = AppState { coordinator };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Listeners of cut-off requests may still be closing their sockets.
    let drained = wait_for_drain(
        &registry,
        Duration::from_secs(config.shutdown_timeout_secs),
    )
    .await;
    if !drained {
        tracing::warn!(
            in_flight_jobs = registry.len(),
            "Shutdown timeout with jobs still in flight",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

async fn wait_for_drain(registry: &JobRegistry, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while !registry.is_empty() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    true
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
