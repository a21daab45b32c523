use ctprov_core::{
    archive_basename, archive_url, host_os, validate_file_name, validate_version_name,
    Architecture, Platform, ProvisionConfig, DEFAULT_ARCHIVE_URL, DEFAULT_TOOL_NAME,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::fetcher::ArchiveFetcher;
use crate::layout::InstallLayout;
use crate::service::ServiceCoordinator;
use crate::store::{VersionDirectory, VersionStore};

/// Archives are unpacked as-is into the version directory.
const STRIP_COMPONENTS: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRequest {
    pub desired_version: String,
    pub install_root: PathBuf,
    pub archive_url_template: String,
    pub platform: Platform,
    pub architecture: Architecture,
    pub tool_name: String,
    pub os: String,
}

impl InstallationRequest {
    pub fn new(
        desired_version: impl Into<String>,
        install_root: impl Into<PathBuf>,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<Self, LifecycleError> {
        let os = match platform {
            Platform::Windows => "windows",
            Platform::Posix => host_os(),
        };
        let request = Self {
            desired_version: desired_version.into(),
            install_root: install_root.into(),
            archive_url_template: DEFAULT_ARCHIVE_URL.to_string(),
            platform,
            architecture,
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            os: os.to_string(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Builds a request from the loaded configuration. `version` overrides
    /// the configured version.
    pub fn from_config(
        config: &ProvisionConfig,
        version: Option<&str>,
    ) -> Result<Self, LifecycleError> {
        let desired_version = version
            .map(str::to_string)
            .or_else(|| config.version.clone())
            .ok_or_else(|| {
                LifecycleError::invalid_request(
                    "no version requested; set `version` in the config or pass --version",
                )
            })?;

        let request = Self {
            desired_version,
            install_root: config.resolved_install_root(),
            archive_url_template: config.archive_url.clone(),
            platform: config.platform,
            architecture: config.architecture,
            tool_name: config.tool_name.clone(),
            os: config.resolved_os(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_archive_url_template(mut self, template: impl Into<String>) -> Self {
        self.archive_url_template = template.into();
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        validate_version_name(&self.desired_version)
            .and_then(|()| validate_file_name("tool name", &self.tool_name))
            .map_err(|err| LifecycleError::invalid_request(err.to_string()))?;
        if self.os.trim().is_empty() {
            return Err(LifecycleError::invalid_request("os must not be empty"));
        }
        if self.install_root.as_os_str().is_empty() {
            return Err(LifecycleError::invalid_request(
                "install root must not be empty",
            ));
        }
        Ok(())
    }

    pub fn archive_basename(&self) -> String {
        archive_basename(
            &self.tool_name,
            &self.desired_version,
            &self.os,
            self.architecture,
        )
    }

    pub fn archive_url(&self) -> String {
        archive_url(
            &self.archive_url_template,
            &self.desired_version,
            &self.archive_basename(),
        )
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(&self.install_root)
    }

    pub fn version_dir(&self) -> PathBuf {
        self.layout().version_dir(&self.desired_version)
    }

    pub fn program_path(&self) -> PathBuf {
        self.layout()
            .program_path(&self.desired_version, &self.tool_name, self.platform)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneFailure {
    pub version: String,
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    pub version: String,
    pub program_path: PathBuf,
    pub archive_url: String,
    pub fetched: bool,
    pub pruned: Vec<String>,
    pub prune_failures: Vec<PruneFailure>,
    pub service_stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStatus {
    Removed,
    NotInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub version: String,
    pub path: PathBuf,
    pub status: RemoveStatus,
}

/// Install and remove operations for one platform variant.
pub trait InstallationProvider {
    fn platform(&self) -> Platform;

    /// Converges the install root to exactly one version directory holding
    /// the requested binary. Re-running with the same request is a no-op.
    fn ensure(&self, request: &InstallationRequest) -> Result<EnsureOutcome, LifecycleError>;

    /// Deletes the requested version directory; absent is not an error.
    fn remove(&self, request: &InstallationRequest) -> Result<RemoveOutcome, LifecycleError>;
}

#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub store: &'a dyn VersionStore,
    pub fetcher: &'a dyn ArchiveFetcher,
    pub service: &'a dyn ServiceCoordinator,
}

pub struct PosixInstallation<'a> {
    collaborators: Collaborators<'a>,
}

impl<'a> PosixInstallation<'a> {
    pub fn new(collaborators: Collaborators<'a>) -> Self {
        Self { collaborators }
    }
}

impl InstallationProvider for PosixInstallation<'_> {
    fn platform(&self) -> Platform {
        Platform::Posix
    }

    fn ensure(&self, request: &InstallationRequest) -> Result<EnsureOutcome, LifecycleError> {
        ensure_version(&self.collaborators, self.platform(), request)
    }

    fn remove(&self, request: &InstallationRequest) -> Result<RemoveOutcome, LifecycleError> {
        remove_version(&self.collaborators, self.platform(), request)
    }
}

pub struct WindowsInstallation<'a> {
    collaborators: Collaborators<'a>,
}

impl<'a> WindowsInstallation<'a> {
    pub fn new(collaborators: Collaborators<'a>) -> Self {
        Self { collaborators }
    }
}

impl InstallationProvider for WindowsInstallation<'_> {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn ensure(&self, request: &InstallationRequest) -> Result<EnsureOutcome, LifecycleError> {
        ensure_version(&self.collaborators, self.platform(), request)
    }

    fn remove(&self, request: &InstallationRequest) -> Result<RemoveOutcome, LifecycleError> {
        remove_version(&self.collaborators, self.platform(), request)
    }
}

pub fn installation_provider<'a>(
    platform: Platform,
    collaborators: Collaborators<'a>,
) -> Box<dyn InstallationProvider + 'a> {
    match platform {
        Platform::Posix => Box::new(PosixInstallation::new(collaborators)),
        Platform::Windows => Box::new(WindowsInstallation::new(collaborators)),
    }
}

fn check_request(
    platform: Platform,
    request: &InstallationRequest,
) -> Result<(), LifecycleError> {
    request.validate()?;
    if request.platform != platform {
        return Err(LifecycleError::invalid_request(format!(
            "request targets {} but the {} provider was selected",
            request.platform.as_str(),
            platform.as_str()
        )));
    }
    Ok(())
}

fn ensure_version(
    collaborators: &Collaborators<'_>,
    platform: Platform,
    request: &InstallationRequest,
) -> Result<EnsureOutcome, LifecycleError> {
    check_request(platform, request)?;
    let layout = request.layout();
    let url = request.archive_url();
    info!(
        version = %request.desired_version,
        root = %layout.root().display(),
        "ensuring installation"
    );

    let installed = collaborators
        .store
        .list(layout.root())
        .map_err(|source| LifecycleError::ListVersions {
            root: layout.root().to_path_buf(),
            source,
        })?;
    let stale: Vec<VersionDirectory> = installed
        .into_iter()
        .filter(|entry| entry.version != request.desired_version)
        .collect();

    let mut service_stopped = false;
    if !stale.is_empty() {
        service_stopped = collaborators.service.stop_if_running().map_err(|source| {
            LifecycleError::ServiceStop {
                stale: stale.iter().map(|entry| entry.version.clone()).collect(),
                source,
            }
        })?;
    }

    let mut pruned = Vec::new();
    let mut prune_failures = Vec::new();
    for entry in stale {
        match collaborators.store.delete_dir(&entry.path) {
            Ok(_) => {
                info!(version = %entry.version, "removed stale version");
                pruned.push(entry.version);
            }
            Err(err) => {
                warn!(
                    version = %entry.version,
                    path = %entry.path.display(),
                    error = %format!("{err:#}"),
                    "failed to remove stale version"
                );
                prune_failures.push(PruneFailure {
                    version: entry.version,
                    path: entry.path,
                    message: format!("{err:#}"),
                });
            }
        }
    }

    let version_dir = layout.version_dir(&request.desired_version);
    collaborators
        .store
        .create_dir(&version_dir)
        .map_err(|source| LifecycleError::CreateVersionDir {
            path: version_dir.clone(),
            source,
        })?;

    let program_path =
        layout.program_path(&request.desired_version, &request.tool_name, platform);
    let fetched = if collaborators.store.has_file(&program_path) {
        debug!(program = %program_path.display(), "binary already present; skipping fetch");
        false
    } else {
        info!(url = %url, destination = %version_dir.display(), "fetching archive");
        if let Err(source) = collaborators
            .fetcher
            .fetch(&url, &version_dir, STRIP_COMPONENTS)
        {
            discard_partial_fetch(collaborators.store, &version_dir);
            return Err(LifecycleError::Fetch {
                url,
                destination: version_dir,
                source,
            });
        }
        if !collaborators.store.has_file(&program_path) {
            return Err(LifecycleError::MissingProgram {
                url,
                path: program_path,
            });
        }
        true
    };

    Ok(EnsureOutcome {
        version: request.desired_version.clone(),
        program_path,
        archive_url: url,
        fetched,
        pruned,
        prune_failures,
        service_stopped,
    })
}

/// A failed fetch may have left files behind; without the directory the next
/// ensure sees no binary and fetches again.
fn discard_partial_fetch(store: &dyn VersionStore, version_dir: &Path) {
    if let Err(err) = store.delete_dir(version_dir) {
        warn!(
            path = %version_dir.display(),
            error = %format!("{err:#}"),
            "failed to discard partially fetched version"
        );
    }
}

fn remove_version(
    collaborators: &Collaborators<'_>,
    platform: Platform,
    request: &InstallationRequest,
) -> Result<RemoveOutcome, LifecycleError> {
    check_request(platform, request)?;
    let path = request.version_dir();
    let removed = collaborators
        .store
        .delete_dir(&path)
        .map_err(|source| LifecycleError::Remove {
            path: path.clone(),
            source,
        })?;

    let status = if removed {
        info!(version = %request.desired_version, "removed version");
        RemoveStatus::Removed
    } else {
        debug!(version = %request.desired_version, "version not installed; nothing to remove");
        RemoveStatus::NotInstalled
    };
    Ok(RemoveOutcome {
        version: request.desired_version.clone(),
        path,
        status,
    })
}
