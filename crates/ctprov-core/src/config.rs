use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::naming::{validate_file_name, validate_version_name};
use crate::platform::{host_os, Architecture, InitStyle, Platform, ServiceKind};
use crate::template::TemplateDescriptor;

pub const DEFAULT_TOOL_NAME: &str = "consul-template";
pub const DEFAULT_ARCHIVE_URL: &str =
    "https://releases.hashicorp.com/consul-template/{version}/{basename}";
const DEFAULT_TEMPLATE_MODE: &str = "0640";
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionConfig {
    pub version: Option<String>,
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    pub install_root: Option<PathBuf>,
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    #[serde(default = "Platform::host")]
    pub platform: Platform,
    #[serde(default = "Architecture::host")]
    pub architecture: Architecture,
    pub os: Option<String>,
    #[serde(default)]
    pub init_style: InitStyle,
    pub archive_sha256: Option<String>,
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub config: ConfigDirSettings,
    #[serde(default)]
    pub config_files: Vec<ConfigFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSettings {
    pub name: Option<String>,
    #[serde(default = "default_tool_name")]
    pub user: String,
    #[serde(default = "default_tool_name")]
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDirSettings {
    pub conf_dir: Option<PathBuf>,
    #[serde(default = "default_template_mode")]
    pub template_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    pub name: String,
    #[serde(default)]
    pub templates: Vec<TemplateDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwnership {
    pub user: String,
    pub group: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            version: None,
            tool_name: default_tool_name(),
            install_root: None,
            archive_url: default_archive_url(),
            platform: Platform::host(),
            architecture: Architecture::host(),
            os: None,
            init_style: InitStyle::default(),
            archive_sha256: None,
            cache_dir: None,
            download_timeout_secs: default_download_timeout_secs(),
            service: ServiceSettings::default(),
            config: ConfigDirSettings::default(),
            config_files: Vec::new(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: None,
            user: default_tool_name(),
            group: default_tool_name(),
        }
    }
}

impl Default for ConfigDirSettings {
    fn default() -> Self {
        Self {
            conf_dir: None,
            template_mode: default_template_mode(),
        }
    }
}

impl ProvisionConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse ctprov config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_file_name("tool_name", &self.tool_name)?;
        if let Some(version) = &self.version {
            validate_version_name(version)?;
        }
        if !self.archive_url.contains("{basename}") {
            return Err(anyhow!(
                "archive_url '{}' must contain the {{basename}} placeholder",
                self.archive_url
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(anyhow!("download_timeout_secs must be greater than zero"));
        }
        if let Some(sha256) = &self.archive_sha256 {
            if sha256.len() != 64 || !sha256.chars().all(|ch| ch.is_ascii_hexdigit()) {
                return Err(anyhow!(
                    "archive_sha256 must be 64 hex characters, got '{sha256}'"
                ));
            }
        }
        self.template_mode_bits()?;

        let mut seen_names = HashSet::new();
        for config_file in &self.config_files {
            validate_file_name("config file name", &config_file.name)?;
            if !seen_names.insert(config_file.name.as_str()) {
                return Err(anyhow!(
                    "duplicate config file declaration '{}'",
                    config_file.name
                ));
            }
        }
        Ok(())
    }

    pub fn resolved_install_root(&self) -> PathBuf {
        if let Some(root) = &self.install_root {
            return root.clone();
        }
        match self.platform {
            Platform::Posix => PathBuf::from("/opt").join(&self.tool_name),
            Platform::Windows => PathBuf::from(r"C:\Program Files").join(&self.tool_name),
        }
    }

    pub fn resolved_conf_dir(&self) -> PathBuf {
        if let Some(conf_dir) = &self.config.conf_dir {
            return conf_dir.clone();
        }
        match self.platform {
            Platform::Posix => PathBuf::from("/etc").join(format!("{}.d", self.tool_name)),
            Platform::Windows => PathBuf::from(r"C:\Program Files")
                .join(&self.tool_name)
                .join("conf.d"),
        }
    }

    pub fn resolved_os(&self) -> String {
        self.os
            .clone()
            .unwrap_or_else(|| match self.platform {
                Platform::Windows => "windows".to_string(),
                Platform::Posix => host_os().to_string(),
            })
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ctprov-cache"))
    }

    pub fn service_name(&self) -> &str {
        self.service.name.as_deref().unwrap_or(&self.tool_name)
    }

    pub fn service_kind(&self) -> Option<ServiceKind> {
        ServiceKind::resolve(self.platform, self.init_style)
    }

    /// Owner of rendered files: the service account under a managed init
    /// style, root otherwise, nobody on Windows.
    pub fn file_ownership(&self) -> Option<FileOwnership> {
        if self.platform == Platform::Windows {
            return None;
        }
        if self.init_style.is_managed() {
            return Some(FileOwnership {
                user: self.service.user.clone(),
                group: self.service.group.clone(),
            });
        }
        Some(FileOwnership {
            user: "root".to_string(),
            group: "root".to_string(),
        })
    }

    pub fn template_mode_bits(&self) -> anyhow::Result<u32> {
        parse_octal_mode(&self.config.template_mode)
    }

    pub fn config_file(&self, name: &str) -> Option<&ConfigFile> {
        self.config_files
            .iter()
            .find(|config_file| config_file.name == name)
    }
}

fn parse_octal_mode(raw: &str) -> anyhow::Result<u32> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| anyhow!("template_mode '{raw}' is not an octal file mode"))?;
    if mode > 0o7777 {
        return Err(anyhow!("template_mode '{raw}' is out of range"));
    }
    Ok(mode)
}

fn default_tool_name() -> String {
    DEFAULT_TOOL_NAME.to_string()
}

fn default_archive_url() -> String {
    DEFAULT_ARCHIVE_URL.to_string()
}

fn default_template_mode() -> String {
    DEFAULT_TEMPLATE_MODE.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}
