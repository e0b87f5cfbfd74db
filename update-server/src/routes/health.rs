use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use update_agent::fs::walker::walk_directory;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Published file count; absent when the release directory cannot be read
    pub files: Option<usize>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let release_dir = state.config.release_dir.clone();
    let walk = state.publish_options().walk;
    let files = tokio::task::spawn_blocking(move || walk_directory(&release_dir, &walk))
        .await
        .ok()
        .and_then(|walked| walked.ok())
        .map(|files| files.len());

    Json(HealthResponse {
        status: if files.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        files,
    })
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{get, router_for};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_health_counts_files() {
        let release = TempDir::new().unwrap();
        std::fs::write(release.path().join("a.txt"), b"a").unwrap();
        std::fs::write(release.path().join("b.txt"), b"b").unwrap();

        let (status, body) = get(router_for(release.path()), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["files"], 2);
    }

    #[tokio::test]
    async fn test_health_degraded_without_release_dir() {
        let release = TempDir::new().unwrap();
        let (_, body) = get(router_for(&release.path().join("missing")), "/health").await;

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert!(json["files"].is_null());
    }
}
