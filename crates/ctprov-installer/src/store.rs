use anyhow::{Context, Result};
use ctprov_core::compare_version_names;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fs_utils::remove_path_if_exists;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDirectory {
    pub version: String,
    pub path: PathBuf,
}

/// Filesystem view of installed versions. Implementations must not cache:
/// every `list` reflects the current state of the install root.
pub trait VersionStore {
    fn list(&self, install_root: &Path) -> Result<Vec<VersionDirectory>>;

    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Returns `false` when nothing existed at `path`.
    fn delete_dir(&self, path: &Path) -> Result<bool>;

    fn has_file(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsVersionStore;

impl VersionStore for FsVersionStore {
    fn list(&self, install_root: &Path) -> Result<Vec<VersionDirectory>> {
        if !install_root.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(install_root).with_context(|| {
            format!(
                "failed to read install root: {}",
                install_root.display()
            )
        })? {
            let entry = entry?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            let version = entry.file_name().to_string_lossy().into_owned();
            // Hidden entries are fetch staging dirs, never versions.
            if !file_type.is_dir() || version.starts_with('.') {
                continue;
            }
            versions.push(VersionDirectory {
                version,
                path: entry.path(),
            });
        }

        versions.sort_by(|left, right| compare_version_names(&left.version, &right.version));
        Ok(versions)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
    }

    fn delete_dir(&self, path: &Path) -> Result<bool> {
        remove_path_if_exists(path).with_context(|| format!("failed to remove {}", path.display()))
    }

    fn has_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}
