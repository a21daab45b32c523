mod archive;
mod config;
mod naming;
mod platform;
mod template;

pub use archive::ArchiveType;
pub use config::{
    ConfigDirSettings, ConfigFile, FileOwnership, ProvisionConfig, ServiceSettings,
    DEFAULT_ARCHIVE_URL, DEFAULT_TOOL_NAME,
};
pub use naming::{
    archive_basename, archive_url, compare_version_names, program_file_name,
    validate_file_name, validate_version_name,
};
pub use platform::{host_os, Architecture, InitStyle, Platform, ServiceKind};
pub use template::TemplateDescriptor;

#[cfg(test)]
mod tests;
