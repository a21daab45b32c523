use std::cmp::Ordering;

use anyhow::anyhow;
use semver::Version;

use crate::platform::{Architecture, Platform};

/// Release archive name, e.g. `consul-template_0.19.0_linux_amd64.zip`.
pub fn archive_basename(tool: &str, version: &str, os: &str, arch: Architecture) -> String {
    format!(
        "{}.zip",
        [tool, version, os, arch.download_token()].join("_")
    )
}

/// Substitutes `{version}` and `{basename}` in a download URL template.
pub fn archive_url(template: &str, version: &str, basename: &str) -> String {
    template
        .replace("{version}", version)
        .replace("{basename}", basename)
}

pub fn program_file_name(tool: &str, platform: Platform) -> String {
    format!("{tool}{}", platform.executable_suffix())
}

/// Version names become directory names under the install root.
pub fn validate_version_name(version: &str) -> anyhow::Result<()> {
    validate_file_name("version", version)
}

pub fn validate_file_name(kind: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{kind} must not be empty"));
    }
    if value != value.trim() {
        return Err(anyhow!(
            "{kind} '{value}' must not have leading or trailing whitespace"
        ));
    }
    if value == "." || value == ".." {
        return Err(anyhow!("{kind} '{value}' is not a valid directory name"));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(anyhow!("{kind} '{value}' must not contain path separators"));
    }
    Ok(())
}

/// Orders version names by semver when both parse, lexicographically otherwise.
pub fn compare_version_names(left: &str, right: &str) -> Ordering {
    let parse = |value: &str| Version::parse(value.trim_start_matches('v')).ok();
    match (parse(left), parse(right)) {
        (Some(left_version), Some(right_version)) => left_version
            .cmp(&right_version)
            .then_with(|| left.cmp(right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}
