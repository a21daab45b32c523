use anyhow::{anyhow, Context, Result};
use ctprov_core::ServiceKind;
use std::process::Command;
use tracing::{debug, info};

use crate::command::{capture_command, escape_ps_single_quote, CommandOutput};

/// Stops the managed service ahead of a destructive version swap.
pub trait ServiceCoordinator {
    /// Returns whether a stop was issued. A failed query or stop is an error.
    fn stop_if_running(&self) -> Result<bool>;
}

/// Used on hosts where the tool is not supervised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopServiceCoordinator;

impl ServiceCoordinator for NoopServiceCoordinator {
    fn stop_if_running(&self) -> Result<bool> {
        Ok(false)
    }
}

pub type CommandRunner = fn(&mut Command) -> Result<CommandOutput>;

pub struct SystemServiceCoordinator<RunCommand = CommandRunner> {
    kind: ServiceKind,
    service_name: String,
    run: RunCommand,
}

impl SystemServiceCoordinator {
    pub fn new(kind: ServiceKind, service_name: impl Into<String>) -> Self {
        Self::with_runner(kind, service_name, capture_command)
    }
}

impl<RunCommand> SystemServiceCoordinator<RunCommand>
where
    RunCommand: Fn(&mut Command) -> Result<CommandOutput>,
{
    pub fn with_runner(
        kind: ServiceKind,
        service_name: impl Into<String>,
        run: RunCommand,
    ) -> Self {
        Self {
            kind,
            service_name: service_name.into(),
            run,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn is_running(&self) -> Result<bool> {
        let mut command = build_status_command(self.kind, &self.service_name);
        let output = (self.run)(&mut command).with_context(|| {
            format!(
                "failed to query {} service '{}'",
                self.kind.as_str(),
                self.service_name
            )
        })?;
        Ok(status_reports_running(self.kind, &output))
    }
}

impl<RunCommand> ServiceCoordinator for SystemServiceCoordinator<RunCommand>
where
    RunCommand: Fn(&mut Command) -> Result<CommandOutput>,
{
    fn stop_if_running(&self) -> Result<bool> {
        if !self.is_running()? {
            debug!(
                service = %self.service_name,
                kind = self.kind.as_str(),
                "service is not running; nothing to stop"
            );
            return Ok(false);
        }

        info!(
            service = %self.service_name,
            kind = self.kind.as_str(),
            "stopping service before replacing binaries"
        );
        let mut command = build_stop_command(self.kind, &self.service_name);
        let output = (self.run)(&mut command).with_context(|| {
            format!(
                "failed to stop {} service '{}'",
                self.kind.as_str(),
                self.service_name
            )
        })?;
        if !output.success {
            return Err(anyhow!(
                "failed to stop {} service '{}': {}",
                self.kind.as_str(),
                self.service_name,
                output.describe()
            ));
        }

        if self.is_running()? {
            return Err(anyhow!(
                "{} service '{}' is still running after stop",
                self.kind.as_str(),
                self.service_name
            ));
        }
        Ok(true)
    }
}

/// Picks the coordinator for a resolved service kind; `None` means unmanaged.
pub fn service_coordinator(
    kind: Option<ServiceKind>,
    service_name: &str,
) -> Box<dyn ServiceCoordinator> {
    match kind {
        Some(kind) => Box::new(SystemServiceCoordinator::new(kind, service_name)),
        None => Box::new(NoopServiceCoordinator),
    }
}

pub(crate) fn build_status_command(kind: ServiceKind, service_name: &str) -> Command {
    match kind {
        ServiceKind::Systemd => {
            let mut command = Command::new("systemctl");
            command.arg("is-active").arg("--quiet").arg(service_name);
            command
        }
        ServiceKind::Runit => {
            let mut command = Command::new("sv");
            command.arg("status").arg(service_name);
            command
        }
        ServiceKind::Upstart => {
            let mut command = Command::new("initctl");
            command.arg("status").arg(service_name);
            command
        }
        ServiceKind::Windows => {
            let mut command = Command::new("sc.exe");
            command.arg("query").arg(service_name);
            command
        }
    }
}

pub(crate) fn build_stop_command(kind: ServiceKind, service_name: &str) -> Command {
    match kind {
        ServiceKind::Systemd => {
            let mut command = Command::new("systemctl");
            command.arg("stop").arg(service_name);
            command
        }
        ServiceKind::Runit => {
            let mut command = Command::new("sv");
            command.arg("stop").arg(service_name);
            command
        }
        ServiceKind::Upstart => {
            let mut command = Command::new("initctl");
            command.arg("stop").arg(service_name);
            command
        }
        ServiceKind::Windows => {
            let mut command = Command::new("powershell");
            command.arg("-NoProfile").arg("-Command").arg(format!(
                "Stop-Service -Name '{}' -Force -ErrorAction Stop",
                escape_ps_single_quote(service_name)
            ));
            command
        }
    }
}

pub(crate) fn status_reports_running(kind: ServiceKind, output: &CommandOutput) -> bool {
    if !output.success {
        return false;
    }
    match kind {
        ServiceKind::Systemd => true,
        ServiceKind::Runit => output.stdout.trim_start().starts_with("run:"),
        ServiceKind::Upstart => output.stdout.contains("start/running"),
        ServiceKind::Windows => output.stdout.contains("RUNNING"),
    }
}
