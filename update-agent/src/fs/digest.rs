//! Content digests used to decide whether a local file matches the manifest.
//!
//! Digests cover the full byte content of a file and are rendered as
//! lowercase, zero-padded hex.

use crate::utils::errors::ManifestError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Read buffer for streaming file digests (64KB)
const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    /// Accepted for manifests produced by legacy tooling
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Width of a rendered digest in hex characters.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Md5 => 32,
        }
    }

    pub fn hasher(self) -> ContentHasher {
        match self {
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => ContentHasher::Md5(md5::Context::new()),
        }
    }

    /// Whether `hash` is a well-formed lowercase digest for this algorithm.
    pub fn is_valid_digest(self, hash: &str) -> bool {
        hash.len() == self.hex_len()
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "md5" => Ok(HashAlgorithm::Md5),
            _ => Err(ManifestError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Incremental hasher over one of the supported algorithms.
pub enum ContentHasher {
    Sha256(Sha256),
    Md5(md5::Context),
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Sha256(hasher) => hasher.update(data),
            ContentHasher::Md5(context) => context.consume(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Sha256(hasher) => hex::encode(hasher.finalize()),
            ContentHasher::Md5(context) => hex::encode(context.compute().0),
        }
    }
}

/// Digest an in-memory buffer.
pub fn digest_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}

/// Digest the full content of a file.
pub fn digest_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; DIGEST_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize_hex())
}
