//! Streams one file's bytes into the staging area while hashing them.

use crate::fs::digest::HashAlgorithm;
use crate::manifest::Source;
use crate::utils::errors::{ApplyCause, FetchError};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tokio::time::{Duration, Instant};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

const READ_CHUNK: usize = 64 * 1024;

/// Minimum spacing between progress callbacks for one file
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApplyCause>> + Send>>;

/// Download `source_url` to `staged_path` and verify its digest.
///
/// The staged file is removed on any failure, including cancellation.
/// `on_progress` receives the cumulative byte count.
pub(crate) async fn fetch_to_staging<F>(
    client: &reqwest::Client,
    source_url: &str,
    staged_path: &Path,
    algorithm: HashAlgorithm,
    expected_hash: &str,
    cancel: &CancellationToken,
    on_progress: F,
) -> Result<u64, ApplyCause>
where
    F: FnMut(u64),
{
    let result = stream_and_verify(
        client,
        source_url,
        staged_path,
        algorithm,
        expected_hash,
        cancel,
        on_progress,
    )
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(staged_path).await;
    }
    result
}

async fn stream_and_verify<F>(
    client: &reqwest::Client,
    source_url: &str,
    staged_path: &Path,
    algorithm: HashAlgorithm,
    expected_hash: &str,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<u64, ApplyCause>
where
    F: FnMut(u64),
{
    let mut stream = open_source(client, source_url).await?;

    if let Some(parent) = staged_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(staged_path).await?;
    let mut hasher = algorithm.hasher();
    let mut received = 0u64;
    let mut last_report = Instant::now();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApplyCause::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;

        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;

        if last_report.elapsed() >= PROGRESS_INTERVAL {
            on_progress(received);
            last_report = Instant::now();
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    on_progress(received);

    let actual = hasher.finalize_hex();
    if actual != expected_hash {
        return Err(ApplyCause::ChecksumMismatch {
            expected: expected_hash.to_string(),
            actual,
        });
    }
    Ok(received)
}

async fn open_source(client: &reqwest::Client, source_url: &str) -> Result<ByteStream, ApplyCause> {
    match Source::parse(source_url) {
        Some(Source::Http(url)) => {
            let response = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(source_url, e))?;

            if !response.status().is_success() {
                return Err(FetchError::Status {
                    url: source_url.to_string(),
                    status: response.status().as_u16(),
                }
                .into());
            }

            let url = source_url.to_string();
            Ok(Box::pin(response.bytes_stream().map(move |chunk| {
                chunk.map_err(|e| ApplyCause::Fetch(FetchError::from_reqwest(&url, e)))
            })))
        }
        Some(Source::File(path)) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|source| FetchError::Io {
                    path: path.clone(),
                    source,
                })?;
            Ok(Box::pin(ReaderStream::with_capacity(file, READ_CHUNK).map(
                move |chunk| {
                    chunk.map_err(|source| {
                        ApplyCause::Fetch(FetchError::Io {
                            path: path.clone(),
                            source,
                        })
                    })
                },
            )))
        }
        None => Err(FetchError::Io {
            path: PathBuf::from(source_url),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "unsupported source"),
        }
        .into()),
    }
}
