//! Shared HTTP client for manifest and file transfers.

use crate::config::DownloadConfig;
use crate::utils::errors::{Result, UpdateError};

/// Build the client used for every request of a session.
///
/// The whole-request timeout bounds each file so a single unresponsive
/// source cannot hang the session.
pub fn build_http_client(download: &DownloadConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(download.user_agent.clone())
        .connect_timeout(download.connect_timeout())
        .timeout(download.timeout())
        .build()
        .map_err(|e| UpdateError::Config(format!("failed to build HTTP client: {e}")))
}
