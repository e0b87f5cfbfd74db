mod config;
mod error;
mod routes;
mod state;

use crate::config::AppConfig;
use crate::state::AppState;
use std::sync::Arc;
use update_agent::shutdown::wait_for_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    tracing::info!(
        "Starting update server on port {} (release dir: {}, {})",
        config.port,
        config.release_dir.display(),
        config.hash_algorithm
    );
    if !config.release_dir.is_dir() {
        tracing::warn!(
            "Release directory {} does not exist yet",
            config.release_dir.display()
        );
    }

    let state = Arc::new(AppState::new(config.clone()));
    let app = routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
