use crate::config::AppConfig;
use update_agent::fs::walker::WalkOptions;
use update_agent::manifest::publish::PublishOptions;

pub struct AppState {
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            application: self.config.app_name.clone(),
            algorithm: self.config.hash_algorithm,
            base_url: self.config.public_url.clone(),
            walk: WalkOptions::default(),
        }
    }
}
