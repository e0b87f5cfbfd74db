use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use std::sync::Arc;
use update_agent::manifest::publish::build_manifest;

/// Manifest generated from the release directory on every request.
pub async fn get_manifest(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let release_dir = state.config.release_dir.clone();
    if !release_dir.is_dir() {
        return Err(AppError::NotFound(format!(
            "Release directory not found: {}",
            release_dir.display()
        )));
    }

    let options = state.publish_options();
    let index = tokio::task::spawn_blocking(move || build_manifest(&release_dir, &options))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;

    tracing::debug!(files = index.len(), "Serving manifest");
    let body = index.to_json_pretty().map_err(|e| anyhow::anyhow!(e))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}
