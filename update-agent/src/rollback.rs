//! Restores the previous version of every file a session targeted.
//!
//! Each target is restored from its `<path>.old` backup, and only when both the
//! backup and the target exist. Files that were never replaced are left alone.
//! Backups are never deleted here.

use crate::apply::replace::{backup_path, discard_deferred, DEFERRED_MARKER};
use crate::session::DownloadTask;
use crate::utils::errors::RollbackError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct RollbackReport {
    pub restored: Vec<PathBuf>,
    /// Targets without a backup or without a current file
    pub skipped: Vec<PathBuf>,
    /// Pending deferred replacements that were deleted
    pub discarded: Vec<PathBuf>,
    pub errors: Vec<RollbackError>,
}

#[derive(Debug, Clone)]
pub struct RollbackManager {
    system_bin_root: PathBuf,
}

impl RollbackManager {
    pub fn new(system_bin_root: PathBuf) -> Self {
        Self { system_bin_root }
    }

    /// Where a task's file lives under the system bin root.
    ///
    /// One trailing deferred-rename marker is stripped.
    pub fn target_path(&self, task: &DownloadTask) -> PathBuf {
        let relative = task.relative_path.trim_start_matches(['/', '\\']);
        let relative = Path::new(relative);

        let target = match (relative.parent(), relative.file_name()) {
            (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => {
                self.system_bin_root.join(dir).join(name)
            }
            (_, Some(name)) => self.system_bin_root.join(name),
            _ => self.system_bin_root.join(relative),
        };

        let stripped = target
            .to_string_lossy()
            .strip_suffix(DEFERRED_MARKER)
            .map(PathBuf::from);
        stripped.unwrap_or(target)
    }

    /// Restore every task's backup. Blocking; failures are isolated per file.
    pub fn rollback(&self, tasks: &[DownloadTask]) -> RollbackReport {
        let mut report = RollbackReport::default();
        let targets: Vec<PathBuf> = tasks.iter().map(|t| self.target_path(t)).collect();

        let discarded = discard_deferred(&targets);
        report.discarded = discarded.completed;
        report.errors.extend(
            discarded
                .failed
                .into_iter()
                .map(|(path, source)| RollbackError { path, source }),
        );

        for target in targets {
            let backup = backup_path(&target);
            if !backup.is_file() || !target.exists() {
                debug!("Nothing to restore for {}", target.display());
                report.skipped.push(target);
                continue;
            }

            match std::fs::copy(&backup, &target) {
                Ok(_) => {
                    debug!("Restored {}", target.display());
                    report.restored.push(target);
                }
                Err(source) => {
                    warn!("Cannot restore {}: {}", target.display(), source);
                    report.errors.push(RollbackError {
                        path: target,
                        source,
                    });
                }
            }
        }

        info!(
            "Rollback finished: {} restored, {} skipped, {} failed",
            report.restored.len(),
            report.skipped.len(),
            report.errors.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::replace::deferred_path;
    use crate::manifest::RemoteFileEntry;
    use tempfile::TempDir;

    fn task(relative_path: &str) -> DownloadTask {
        let entry = RemoteFileEntry {
            name: relative_path.to_string(),
            relative_path: relative_path.to_string(),
            download_url: format!("https://example.com/{relative_path}"),
            content_hash: "00".repeat(32),
            size_bytes: 1,
            timestamp: None,
        };
        DownloadTask::new(&entry, PathBuf::from("/unused").join(relative_path), false)
    }

    #[test]
    fn test_target_path_mapping() {
        let manager = RollbackManager::new(PathBuf::from("/opt/demo"));

        assert_eq!(manager.target_path(&task("app.dll")), PathBuf::from("/opt/demo/app.dll"));
        assert_eq!(
            manager.target_path(&task("plugins/x/ext.dll")),
            PathBuf::from("/opt/demo/plugins/x/ext.dll")
        );
        assert_eq!(manager.target_path(&task("Demo.exe_")), PathBuf::from("/opt/demo/Demo.exe"));
        assert_eq!(manager.target_path(&task("odd.dll__")), PathBuf::from("/opt/demo/odd.dll_"));
    }

    #[test]
    fn test_restores_only_when_backup_and_target_exist() {
        let root = TempDir::new().unwrap();
        let write = |name: &str, content: &[u8]| std::fs::write(root.path().join(name), content).unwrap();
        write("replaced.dll", b"new");
        write("replaced.dll.old", b"old");
        write("added.dll", b"new");
        write("orphan.dll.old", b"old");

        let manager = RollbackManager::new(root.path().to_path_buf());
        let report = manager.rollback(&[task("replaced.dll"), task("added.dll"), task("orphan.dll")]);

        assert_eq!(report.restored, vec![root.path().join("replaced.dll")]);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.errors.is_empty());
        assert_eq!(std::fs::read(root.path().join("replaced.dll")).unwrap(), b"old");
        assert_eq!(std::fs::read(root.path().join("added.dll")).unwrap(), b"new");
        assert!(!root.path().join("orphan.dll").exists());
        assert!(root.path().join("replaced.dll.old").exists());
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("bin")).unwrap();
        std::fs::write(root.path().join("bin/app.dll"), b"new").unwrap();
        std::fs::write(root.path().join("bin/app.dll.old"), b"old").unwrap();

        let manager = RollbackManager::new(root.path().to_path_buf());
        let tasks = [task("bin/app.dll")];
        manager.rollback(&tasks);
        let second = manager.rollback(&tasks);

        assert_eq!(second.restored.len(), 1);
        assert_eq!(std::fs::read(root.path().join("bin/app.dll")).unwrap(), b"old");
        assert_eq!(std::fs::read(root.path().join("bin/app.dll.old")).unwrap(), b"old");
    }

    #[test]
    fn test_failures_do_not_stop_remaining_files() {
        let root = TempDir::new().unwrap();
        // A backup cannot be copied over a directory
        std::fs::create_dir(root.path().join("broken.dll")).unwrap();
        std::fs::write(root.path().join("broken.dll.old"), b"old").unwrap();
        std::fs::write(root.path().join("good.dll"), b"new").unwrap();
        std::fs::write(root.path().join("good.dll.old"), b"old").unwrap();

        let manager = RollbackManager::new(root.path().to_path_buf());
        let report = manager.rollback(&[task("broken.dll"), task("good.dll")]);

        assert_eq!(report.restored, vec![root.path().join("good.dll")]);
        assert_eq!(std::fs::read(root.path().join("good.dll")).unwrap(), b"old");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, root.path().join("broken.dll"));
    }

    #[test]
    fn test_pending_deferred_replacement_is_discarded() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("locked.dll");
        std::fs::write(&target, b"old").unwrap();
        std::fs::write(deferred_path(&target), b"new").unwrap();

        let report = RollbackManager::new(root.path().to_path_buf()).rollback(&[task("locked.dll")]);

        assert_eq!(report.discarded, vec![target.clone()]);
        assert!(!deferred_path(&target).exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }
}
