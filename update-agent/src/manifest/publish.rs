//! Manifest generation from a release directory.
//!
//! Used by the release server and by `update-agent manifest`.

use super::{ManifestIndex, RemoteFileEntry};
use crate::fs::digest::{digest_file, HashAlgorithm};
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::errors::Result;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub application: Option<String>,
    pub algorithm: HashAlgorithm,
    /// Absolute prefix for file URLs; `files/<path>` relative URLs otherwise
    pub base_url: Option<String>,
    pub walk: WalkOptions,
}

/// Hash every file under `root` into a manifest, one entry per file keyed by its relative path.
pub fn build_manifest(root: &Path, options: &PublishOptions) -> Result<ManifestIndex> {
    let files = walk_directory(root, &options.walk)?;

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let content_hash = digest_file(options.algorithm, &file.path)?;
        let download_url = match &options.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), file.relative_path),
            None => format!("files/{}", file.relative_path),
        };

        entries.push(RemoteFileEntry {
            name: file.relative_path.clone(),
            relative_path: file.relative_path,
            download_url,
            content_hash,
            size_bytes: file.size,
            timestamp: file.modified,
        });
    }

    Ok(ManifestIndex::from_entries(
        options.application.clone(),
        options.algorithm,
        entries,
    )?)
}
