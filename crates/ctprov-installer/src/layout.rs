use ctprov_core::{program_file_name, Platform};
use std::path::{Path, PathBuf};

/// On-disk shape of an install root: `<root>/<version>/<tool>[.exe]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    pub fn program_path(&self, version: &str, tool: &str, platform: Platform) -> PathBuf {
        self.version_dir(version)
            .join(program_file_name(tool, platform))
    }
}
