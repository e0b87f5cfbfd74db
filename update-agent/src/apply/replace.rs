//! Two-phase file replacement.
//!
//! The current file is first copied to `<destination>.old`, which rollback
//! restores from. The staged file is then renamed onto the destination, with a
//! copy through a sibling `<destination>.partial` as fallback. When the destination cannot be written at all (a locked
//! image) the staged file is parked at `<destination>_` and promoted later by
//! [`finalize_deferred`], once the host has exited.

use crate::fs::metadata::FileMetadata;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BACKUP_SUFFIX: &str = ".old";
pub const DEFERRED_MARKER: char = '_';
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// New content waits at this marker path
    Deferred(PathBuf),
}

/// Per-file results of finalizing or discarding deferred replacements.
#[derive(Debug, Default)]
pub struct DeferredOutcome {
    pub completed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn backup_path(destination: &Path) -> PathBuf {
    with_suffix(destination, BACKUP_SUFFIX)
}

pub fn deferred_path(destination: &Path) -> PathBuf {
    with_suffix(destination, &DEFERRED_MARKER.to_string())
}

/// Copy `source` beside `destination`, then rename it into place.
///
/// The live file is never truncated; a failed copy leaves it untouched.
fn copy_into_place(source: &Path, destination: &Path) -> io::Result<()> {
    let partial = with_suffix(destination, PARTIAL_SUFFIX);
    let result = std::fs::copy(source, &partial)
        .and_then(|_| std::fs::rename(&partial, destination));
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

/// Move `staged` onto `destination`, backing up the current file first.
pub fn replace_file(staged: &Path, destination: &Path) -> io::Result<ReplaceOutcome> {
    let previous = if destination.is_file() {
        let metadata = FileMetadata::from_path(destination).ok();
        std::fs::copy(destination, backup_path(destination))?;
        metadata
    } else {
        None
    };

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let outcome = match std::fs::rename(staged, destination) {
        Ok(()) => ReplaceOutcome::Replaced,
        Err(rename_err) => match copy_into_place(staged, destination) {
            Ok(()) => {
                let _ = std::fs::remove_file(staged);
                ReplaceOutcome::Replaced
            }
            Err(copy_err) => {
                debug!(
                    "Cannot replace {} (rename: {}, copy: {}), deferring",
                    destination.display(),
                    rename_err,
                    copy_err
                );
                let marker = deferred_path(destination);
                std::fs::rename(staged, &marker).or_else(|_| {
                    std::fs::copy(staged, &marker)?;
                    std::fs::remove_file(staged)
                })?;
                ReplaceOutcome::Deferred(marker)
            }
        },
    };

    if let Some(metadata) = previous {
        let written = match &outcome {
            ReplaceOutcome::Replaced => destination,
            ReplaceOutcome::Deferred(marker) => marker.as_path(),
        };
        if let Err(e) = metadata.apply_to_path(written) {
            warn!("Cannot carry permissions to {}: {}", written.display(), e);
        }
    }

    Ok(outcome)
}

/// Promote each pending `<destination>_` onto `<destination>`.
///
/// Destinations without a pending marker are skipped.
pub fn finalize_deferred(destinations: &[PathBuf]) -> DeferredOutcome {
    let mut outcome = DeferredOutcome::default();

    for destination in destinations {
        let marker = deferred_path(destination);
        if !marker.is_file() {
            continue;
        }

        let result = std::fs::rename(&marker, destination).or_else(|_| {
            copy_into_place(&marker, destination)?;
            std::fs::remove_file(&marker)
        });
        match result {
            Ok(()) => outcome.completed.push(destination.clone()),
            Err(e) => {
                warn!("Cannot finalize {}: {}", destination.display(), e);
                outcome.failed.push((destination.clone(), e));
            }
        }
    }
    outcome
}

/// Delete pending `<destination>_` files so they are never promoted.
pub fn discard_deferred(destinations: &[PathBuf]) -> DeferredOutcome {
    let mut outcome = DeferredOutcome::default();

    for destination in destinations {
        let marker = deferred_path(destination);
        if !marker.is_file() {
            continue;
        }
        match std::fs::remove_file(&marker) {
            Ok(()) => outcome.completed.push(destination.clone()),
            Err(e) => {
                warn!("Cannot discard {}: {}", marker.display(), e);
                outcome.failed.push((destination.clone(), e));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replace_existing_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staged.dll");
        let destination = dir.path().join("app.dll");
        std::fs::write(&staged, b"new").unwrap();
        std::fs::write(&destination, b"old").unwrap();

        let outcome = replace_file(&staged, &destination).unwrap();

        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
        assert_eq!(std::fs::read(dir.path().join("app.dll.old")).unwrap(), b"old");
        assert!(!staged.exists());
    }

    #[test]
    fn test_replace_new_file_creates_parents_without_backup() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staged");
        let destination = dir.path().join("plugins/extra/plugin.dll");
        std::fs::write(&staged, b"plugin").unwrap();

        replace_file(&staged, &destination).unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"plugin");
        assert!(!backup_path(&destination).exists());
    }

    #[test]
    fn test_unwritable_destination_is_deferred() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staged");
        std::fs::write(&staged, b"new").unwrap();
        // A non-empty directory can be neither renamed over nor copied onto
        let destination = dir.path().join("locked");
        std::fs::create_dir(&destination).unwrap();
        std::fs::write(destination.join("inner"), b"x").unwrap();

        let outcome = replace_file(&staged, &destination).unwrap();

        let marker = dir.path().join("locked_");
        assert_eq!(outcome, ReplaceOutcome::Deferred(marker.clone()));
        assert_eq!(std::fs::read(&marker).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_carried_over() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staged");
        let destination = dir.path().join("tool");
        std::fs::write(&staged, b"v2").unwrap();
        std::fs::write(&destination, b"v1").unwrap();
        std::fs::set_permissions(&destination, std::fs::Permissions::from_mode(0o755)).unwrap();

        replace_file(&staged, &destination).unwrap();

        let mode = std::fs::metadata(&destination).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_finalize_and_discard() {
        let dir = TempDir::new().unwrap();
        let finalized = dir.path().join("a.dll");
        let discarded = dir.path().join("b.dll");
        let untouched = dir.path().join("c.dll");
        std::fs::write(&finalized, b"old a").unwrap();
        std::fs::write(deferred_path(&finalized), b"new a").unwrap();
        std::fs::write(deferred_path(&discarded), b"new b").unwrap();

        let outcome = finalize_deferred(&[finalized.clone(), untouched.clone()]);
        assert_eq!(outcome.completed, vec![finalized.clone()]);
        assert!(outcome.failed.is_empty());
        assert_eq!(std::fs::read(&finalized).unwrap(), b"new a");
        assert!(!deferred_path(&finalized).exists());

        let outcome = discard_deferred(&[discarded.clone(), untouched]);
        assert_eq!(outcome.completed, vec![discarded.clone()]);
        assert!(!deferred_path(&discarded).exists());
        assert!(!discarded.exists());
    }

    #[test]
    fn test_copy_into_place_writes_through_partial() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("staged");
        let destination = dir.path().join("app.dll");
        std::fs::write(&source, b"new").unwrap();
        std::fs::write(&destination, b"old").unwrap();

        copy_into_place(&source, &destination).unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
        assert_eq!(std::fs::read(&source).unwrap(), b"new");
        assert!(!dir.path().join("app.dll.partial").exists());
    }

    #[test]
    fn test_failed_copy_into_place_leaves_destination_intact() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("app.dll");
        std::fs::write(&destination, b"live").unwrap();

        assert!(copy_into_place(&dir.path().join("missing"), &destination).is_err());
        assert_eq!(std::fs::read(&destination).unwrap(), b"live");
        assert!(!dir.path().join("app.dll.partial").exists());

        // The final swap fails when the destination is a non-empty directory
        let source = dir.path().join("staged");
        std::fs::write(&source, b"new").unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("inner"), b"x").unwrap();

        assert!(copy_into_place(&source, &locked).is_err());
        assert_eq!(std::fs::read(locked.join("inner")).unwrap(), b"x");
        assert!(!dir.path().join("locked.partial").exists());
    }

    #[test]
    fn test_marker_paths() {
        let destination = Path::new("/opt/demo/bin/app.dll");
        assert_eq!(backup_path(destination), PathBuf::from("/opt/demo/bin/app.dll.old"));
        assert_eq!(deferred_path(destination), PathBuf::from("/opt/demo/bin/app.dll_"));
    }
}
