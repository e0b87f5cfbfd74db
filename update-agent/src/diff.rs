//! Decides which manifest entries must be downloaded.
//!
//! An entry is planned when the local file is missing or its content digest
//! differs from the manifest's. Size and timestamp are carried along but never
//! used as the change criterion. Entries naming the running executable or the
//! updater binary are never planned.

use crate::fs::digest::{digest_file, HashAlgorithm};
use crate::manifest::ManifestIndex;
use crate::session::DownloadTask;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The process images the engine must never replace.
#[derive(Debug, Clone)]
pub struct SelfIdentity {
    current_exe: PathBuf,
    updater_binary: PathBuf,
    lowercase_names: Vec<String>,
}

impl SelfIdentity {
    pub fn new(current_exe: PathBuf, updater_binary: PathBuf) -> Self {
        let lowercase_names = [&current_exe, &updater_binary]
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().to_lowercase())
            .collect();
        Self {
            current_exe,
            updater_binary,
            lowercase_names,
        }
    }

    /// Base-name match, ignoring case.
    pub fn matches_name(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .is_some_and(|name| self.lowercase_names.contains(&name))
    }

    /// Base-name match or exact path match.
    pub fn matches(&self, path: &Path) -> bool {
        self.matches_name(path) || path == self.current_exe || path == self.updater_binary
    }
}

#[derive(Debug, Clone)]
pub struct DiffEngine {
    install_root: PathBuf,
    identity: SelfIdentity,
}

impl DiffEngine {
    pub fn new(install_root: PathBuf, identity: SelfIdentity) -> Self {
        Self {
            install_root,
            identity,
        }
    }

    /// Absolute local path for a manifest-relative path.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.install_root.join(relative_path)
    }

    /// Compute the ordered download plan. An empty plan means up to date.
    ///
    /// Reads local files; call from a blocking context.
    pub fn compute(&self, index: &ManifestIndex) -> Vec<DownloadTask> {
        let algorithm = index.algorithm();
        let mut tasks = Vec::new();

        for entry in index.iter() {
            let local_path = self.resolve(&entry.relative_path);

            if self.identity.matches_name(&local_path) {
                debug!(name = %entry.name, "Skipping self-referential entry");
                continue;
            }

            if is_changed(algorithm, &local_path, &entry.content_hash) {
                tasks.push(DownloadTask::new(entry, local_path, false));
            }
        }

        debug!(
            "Diff complete: {} of {} entries need download",
            tasks.len(),
            index.len()
        );
        tasks
    }
}

fn is_changed(algorithm: HashAlgorithm, local_path: &Path, expected: &str) -> bool {
    if !local_path.is_file() {
        return true;
    }
    match digest_file(algorithm, local_path) {
        Ok(actual) => actual != expected,
        Err(e) => {
            // An unreadable file is treated as stale; the apply step decides whether it can be replaced
            warn!("Cannot hash {}: {}", local_path.display(), e);
            true
        }
    }
}
