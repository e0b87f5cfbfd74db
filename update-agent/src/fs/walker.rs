//! Directory traversal for building manifests from a release tree.
//!
//! Backup files (`.old`), interrupted copies (`.partial`), deferred-rename
//! markers (trailing `_`) and the agent's own working folders are never published.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// Entry names skipped entirely (a matching directory prunes its subtree)
    pub exclude_names: Vec<String>,

    /// File name suffixes that are skipped
    pub exclude_suffixes: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: true,
            max_depth: None,
            exclude_names: vec![
                ".git".to_string(),
                ".DS_Store".to_string(),
                ".update-staging".to_string(),
                ".update-agent".to_string(),
            ],
            exclude_suffixes: vec![
                ".old".to_string(),
                ".partial".to_string(),
                "_".to_string(),
            ],
        }
    }
}

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root, `/`-separated
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self {
            path,
            relative_path,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

/// Walk a directory tree and collect all files, sorted by relative path.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut walker = WalkDir::new(root).follow_links(options.follow_links);

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut files = Vec::new();
    let entries = walker
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded_name(entry, &options.exclude_names));

    for entry in entries {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        if has_excluded_suffix(&entry, &options.exclude_suffixes) {
            continue;
        }

        files.push(FileInfo::from_entry(&entry, root)?);
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn is_excluded_name(entry: &DirEntry, names: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    names.iter().any(|name| file_name == name.as_str())
}

fn has_excluded_suffix(entry: &DirEntry, suffixes: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    suffixes.iter().any(|suffix| file_name.ends_with(suffix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("plugins"))?;
        fs::write(temp_dir.path().join("app.dll"), b"content1")?;
        fs::write(temp_dir.path().join("plugins/extra.dll"), b"content22")?;

        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["app.dll", "plugins/extra.dll"]);
        assert_eq!(files[1].size, 9);
        assert!(files[0].modified.is_some());

        Ok(())
    }

    #[test]
    fn test_backups_markers_and_working_dirs_are_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("app.dll"), b"keep")?;
        fs::write(temp_dir.path().join("app.dll.old"), b"backup")?;
        fs::write(temp_dir.path().join("app.dll.partial"), b"interrupted")?;
        fs::write(temp_dir.path().join("app.dll_"), b"pending")?;
        fs::create_dir(temp_dir.path().join(".update-staging"))?;
        fs::write(temp_dir.path().join(".update-staging/app.dll"), b"staged")?;

        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "app.dll");

        Ok(())
    }
}
