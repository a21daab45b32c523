mod command;
mod error;
mod fetcher;
mod fs_utils;
mod layout;
mod lifecycle;
mod service;
mod store;

pub use command::{capture_command, CommandOutput};
pub use error::LifecycleError;
pub use fetcher::{ArchiveFetcher, HttpArchiveFetcher};
pub use layout::InstallLayout;
pub use lifecycle::{
    installation_provider, Collaborators, EnsureOutcome, InstallationProvider,
    InstallationRequest, PosixInstallation, PruneFailure, RemoveOutcome, RemoveStatus,
    WindowsInstallation,
};
pub use service::{
    service_coordinator, CommandRunner, NoopServiceCoordinator, ServiceCoordinator,
    SystemServiceCoordinator,
};
pub use store::{FsVersionStore, VersionDirectory, VersionStore};
