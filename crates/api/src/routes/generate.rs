//! Route definitions for synchronous generation.

use axum::routing::post;
use axum::Router;

use crate::handlers::generate;
use crate::state::AppState;

/// Routes mounted at `/api`.
///
/// ```text
/// POST   /generate        -> generate
/// POST   /generate_file   -> generate_file
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate::generate))
        .route("/generate_file", post(generate::generate_file))
}
