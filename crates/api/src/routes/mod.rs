pub mod generate;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generate                POST   generate (URL or file per responseKind)
/// /generate_file           POST   generate_file (always file)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(generate::router())
}
