use std::path::PathBuf;
use update_agent::fs::digest::HashAlgorithm;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Directory whose files are published
    pub release_dir: PathBuf,
    /// Absolute prefix for file URLs; manifests use relative `files/<path>` URLs otherwise
    pub public_url: Option<String>,
    pub hash_algorithm: HashAlgorithm,
    pub app_name: Option<String>,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let hash_algorithm = match std::env::var("HASH_ALGORITHM") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring HASH_ALGORITHM: {}", e);
                HashAlgorithm::default()
            }),
            Err(_) => HashAlgorithm::default(),
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            release_dir: PathBuf::from(
                std::env::var("RELEASE_DIR").unwrap_or_else(|_| "./release".into()),
            ),
            public_url: std::env::var("PUBLIC_URL").ok().filter(|v| !v.trim().is_empty()),
            hash_algorithm,
            app_name: std::env::var("APP_NAME").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}
