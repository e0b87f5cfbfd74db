//! Manifest retrieval over HTTP(S) or from the local filesystem.

use super::{parse_manifest, ManifestIndex, Source};
use crate::utils::errors::{FetchError, Result, UpdateError};
use tracing::{debug, info};

/// Retrieves and parses the remote manifest. Has no local side effects.
#[derive(Clone)]
pub struct ManifestFetcher {
    client: reqwest::Client,
}

impl ManifestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch and parse the manifest at `location`.
    ///
    /// Transport failures are `FetchError`, malformed content `ManifestError`;
    /// both are fatal for the session.
    pub async fn fetch(&self, location: &str) -> Result<ManifestIndex> {
        let source = Source::parse(location)
            .ok_or_else(|| UpdateError::Config(format!("invalid manifest location: {location}")))?;

        let content = self.fetch_text(&source).await?;
        let index = parse_manifest(&content, &source)?;

        info!(
            "Fetched manifest from {}: {} files, {} bytes ({})",
            source,
            index.len(),
            index.total_bytes(),
            index.algorithm()
        );
        Ok(index)
    }

    async fn fetch_text(&self, source: &Source) -> std::result::Result<String, FetchError> {
        match source {
            Source::Http(url) => {
                debug!(url = %url, "Requesting manifest");
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

                if !response.status().is_success() {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    });
                }

                response
                    .text()
                    .await
                    .map_err(|e| FetchError::from_reqwest(url.as_str(), e))
            }
            Source::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| FetchError::Io {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::digest::{digest_bytes, HashAlgorithm};
    use crate::utils::errors::ManifestError;
    use mockito::Server;
    use serde_json::json;
    use tempfile::TempDir;

    fn manifest_body() -> String {
        json!({
            "files": [{
                "name": "app.dll",
                "path": "app.dll",
                "url": "files/app.dll",
                "hash": digest_bytes(HashAlgorithm::Sha256, b"v2"),
                "size": 2,
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/release/manifest.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(manifest_body())
            .create_async()
            .await;

        let fetcher = ManifestFetcher::new(reqwest::Client::new());
        let index = fetcher
            .fetch(&format!("{}/release/manifest.json", server.url()))
            .await
            .unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get("app.dll").unwrap().download_url,
            format!("{}/release/files/app.dll", server.url())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status_is_fetch_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/manifest.json")
            .with_status(503)
            .create_async()
            .await;

        let fetcher = ManifestFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch(&format!("{}/manifest.json", server.url())).await;

        assert!(matches!(
            result,
            Err(UpdateError::Fetch(FetchError::Status { status: 503, .. }))
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_from_local_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        std::fs::write(&path, manifest_body()).unwrap();

        let fetcher = ManifestFetcher::new(reqwest::Client::new());
        let index = fetcher.fetch(&path.to_string_lossy()).await.unwrap();

        let entry = index.get("app.dll").unwrap();
        assert_eq!(
            entry.download_url,
            temp_dir.path().join("files/app.dll").display().to_string()
        );
    }

    #[tokio::test]
    async fn test_missing_local_manifest_is_fetch_error() {
        let fetcher = ManifestFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch("/nonexistent/manifest.json").await;
        assert!(matches!(result, Err(UpdateError::Fetch(FetchError::Io { .. }))));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_manifest_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"files":[{"path":"a.dll"}]}"#).unwrap();

        let fetcher = ManifestFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch(&path.to_string_lossy()).await;
        assert!(matches!(
            result,
            Err(UpdateError::Manifest(ManifestError::MissingName { index: 0 }))
        ));
    }
}
