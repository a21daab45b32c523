use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
        }
    }

    /// Suffix appended to the tool name to form the on-disk executable.
    pub fn executable_suffix(self) -> &'static str {
        match self {
            Self::Posix => "",
            Self::Windows => ".exe",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    X64,
}

impl Architecture {
    pub fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::X64
        } else {
            Self::X86
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "x86" | "386" | "i386" | "i686" => Some(Self::X86),
            "x64" | "amd64" | "x86_64" => Some(Self::X64),
            _ => None,
        }
    }

    /// Architecture token used in release archive names.
    pub fn download_token(self) -> &'static str {
        match self {
            Self::X86 => "386",
            Self::X64 => "amd64",
        }
    }
}

/// Init system the tool runs under. Anything unrecognized is unmanaged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum InitStyle {
    Runit,
    Systemd,
    Upstart,
    #[default]
    Unmanaged,
}

impl InitStyle {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "runit" => Self::Runit,
            "systemd" => Self::Systemd,
            "upstart" => Self::Upstart,
            _ => Self::Unmanaged,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runit => "runit",
            Self::Systemd => "systemd",
            Self::Upstart => "upstart",
            Self::Unmanaged => "unmanaged",
        }
    }

    pub fn is_managed(self) -> bool {
        !matches!(self, Self::Unmanaged)
    }
}

impl From<String> for InitStyle {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Systemd,
    Runit,
    Upstart,
    Windows,
}

impl ServiceKind {
    /// Windows hosts always run the tool as a wrapped service; posix hosts
    /// only when a recognized init style is configured.
    pub fn resolve(platform: Platform, init_style: InitStyle) -> Option<Self> {
        match (platform, init_style) {
            (Platform::Windows, _) => Some(Self::Windows),
            (Platform::Posix, InitStyle::Systemd) => Some(Self::Systemd),
            (Platform::Posix, InitStyle::Runit) => Some(Self::Runit),
            (Platform::Posix, InitStyle::Upstart) => Some(Self::Upstart),
            (Platform::Posix, InitStyle::Unmanaged) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Systemd => "systemd",
            Self::Runit => "runit",
            Self::Upstart => "upstart",
            Self::Windows => "windows",
        }
    }
}

/// OS token of the running host as it appears in release archive names.
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}
