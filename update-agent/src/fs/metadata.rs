//! Permission carry-over for replaced files.
//!
//! A freshly downloaded file is created with default permissions; when it
//! replaces an existing file (an executable, typically) the old mode bits
//! are copied onto it so the replacement stays runnable.

use std::fs;
use std::path::Path;

/// Permission snapshot of an installed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// File permissions (Unix mode bits)
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Capture metadata of an existing file
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            size: metadata.len(),
            permissions,
        })
    }

    /// Apply the captured permissions to another file
    #[cfg(unix)]
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.permissions {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply_to_path(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_capture_size() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("app.bin");
        fs::write(&path, b"test content")?;

        let metadata = FileMetadata::from_path(&path)?;
        assert_eq!(metadata.size, 12);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_carry_over() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new()?;
        let old = temp_dir.path().join("old");
        let new = temp_dir.path().join("new");
        fs::write(&old, b"old")?;
        fs::write(&new, b"new")?;
        fs::set_permissions(&old, fs::Permissions::from_mode(0o755))?;
        fs::set_permissions(&new, fs::Permissions::from_mode(0o600))?;

        FileMetadata::from_path(&old)?.apply_to_path(&new)?;

        let mode = fs::metadata(&new)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        Ok(())
    }
}
