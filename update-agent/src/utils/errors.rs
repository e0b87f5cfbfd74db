//! Error types for the update agent.
//!
//! Manifest and manifest-fetch errors are fatal to a session. Apply and
//! rollback errors are per file: they are collected into the session report
//! and never abort the remaining files.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or inconsistent manifest data.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest record #{index} is missing a name")]
    MissingName { index: usize },

    #[error("manifest entry '{name}' is missing field '{field}'")]
    MissingField { name: String, field: &'static str },

    #[error("duplicate manifest entry: {0}")]
    DuplicateEntry(String),

    #[error("manifest entries '{first}' and '{second}' both target {path}")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    #[error("manifest entry '{name}' has an invalid path: {path}")]
    InvalidPath { name: String, path: String },

    #[error("manifest entry '{name}' has an invalid hash: {hash}")]
    InvalidHash { name: String, hash: String },

    #[error("manifest entry '{name}' has an invalid url: {url}")]
    InvalidUrl { name: String, url: String },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Transport failure retrieving the manifest or a file.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Http {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Why a single file could not be applied.
#[derive(Error, Debug)]
pub enum ApplyCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// A per-file apply failure.
#[derive(Error, Debug)]
#[error("{relative_path}: {cause}")]
pub struct ApplyError {
    pub relative_path: String,
    #[source]
    pub cause: ApplyCause,
}

impl ApplyError {
    pub fn new(relative_path: impl Into<String>, cause: impl Into<ApplyCause>) -> Self {
        Self {
            relative_path: relative_path.into(),
            cause: cause.into(),
        }
    }
}

/// A per-file restore failure.
#[derive(Error, Debug)]
#[error("cannot restore {}: {source}", path.display())]
pub struct RollbackError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("refusing to replace running image: {}", .0.display())]
    SelfReplacement(PathBuf),

    #[error("an update session is already active")]
    SessionActive,

    #[error("Session journal error: {0}")]
    Journal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_display_names_file() {
        let err = ApplyError::new(
            "bin/app.dll",
            ApplyCause::ChecksumMismatch {
                expected: "aa".to_string(),
                actual: "bb".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "bin/app.dll: checksum mismatch: expected aa, got bb"
        );
    }

    #[test]
    fn test_manifest_error_converts_into_update_error() {
        let err: UpdateError = ManifestError::DuplicateEntry("app.dll".to_string()).into();
        assert!(matches!(err, UpdateError::Manifest(ManifestError::DuplicateEntry(_))));
        assert_eq!(err.to_string(), "duplicate manifest entry: app.dll");
    }
}
