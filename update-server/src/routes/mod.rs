pub mod health;
pub mod manifest;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let release_dir = state.config.release_dir.clone();

    Router::new()
        .route("/manifest.json", get(manifest::get_manifest))
        .route("/health", get(health::health))
        .nest_service("/files", ServeDir::new(release_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
