use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn describe(&self) -> String {
        let code = self
            .code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        format!(
            "status={} stdout='{}' stderr='{}'",
            code,
            self.stdout.trim(),
            self.stderr.trim()
        )
    }
}

/// Runs a command to completion and captures its output. Only a failure to
/// start the process is an error; a non-zero exit is reported in the output.
pub fn capture_command(command: &mut Command) -> Result<CommandOutput> {
    let output = command
        .output()
        .with_context(|| format!("command failed to start: {command:?}"))?;
    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`capture_command`], but a non-zero exit is an error naming `action`.
pub(crate) fn run_checked(command: &mut Command, action: &str) -> Result<()> {
    let output = capture_command(command)?;
    if output.success {
        return Ok(());
    }
    Err(anyhow!("{action} failed: {}", output.describe()))
}

pub(crate) fn escape_ps_single_quote(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn escape_ps_single_quote_path(path: &Path) -> String {
    escape_ps_single_quote(&path.to_string_lossy())
}
