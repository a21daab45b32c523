use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context};
use ctprov_core::{
    validate_file_name, ConfigFile, FileOwnership, Platform, ProvisionConfig, TemplateDescriptor,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::TemplateError;

const CONF_DIR_MODE: u32 = 0o755;

/// A named consul-template configuration file and the templates it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateResource {
    pub name: String,
    pub templates: Vec<TemplateDescriptor>,
}

impl TemplateResource {
    pub fn new(name: impl Into<String>, templates: Vec<TemplateDescriptor>) -> Self {
        Self {
            name: name.into(),
            templates,
        }
    }
}

impl From<&ConfigFile> for TemplateResource {
    fn from(config_file: &ConfigFile) -> Self {
        Self::new(config_file.name.clone(), config_file.templates.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub conf_dir: PathBuf,
    pub platform: Platform,
    pub ownership: Option<FileOwnership>,
    pub mode: u32,
}

impl RenderContext {
    pub fn from_config(config: &ProvisionConfig) -> anyhow::Result<Self> {
        Ok(Self {
            conf_dir: config.resolved_conf_dir(),
            platform: config.platform,
            ownership: config.file_ownership(),
            mode: config.template_mode_bits()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeOutcome {
    /// Nothing declared; the filesystem was not touched.
    Skipped,
    Written { path: PathBuf, templates: usize },
}

#[derive(Serialize)]
struct RenderedConfig<'a> {
    template: &'a [TemplateDescriptor],
}

pub fn rendered_path(name: &str, conf_dir: &Path) -> PathBuf {
    conf_dir.join(name)
}

pub fn materialize(
    resource: &TemplateResource,
    context: &RenderContext,
) -> Result<MaterializeOutcome, TemplateError> {
    materialize_with_runner(resource, context, run_chown)
}

pub fn materialize_with_runner<RunCommand>(
    resource: &TemplateResource,
    context: &RenderContext,
    run: RunCommand,
) -> Result<MaterializeOutcome, TemplateError>
where
    RunCommand: Fn(&mut Command) -> anyhow::Result<()>,
{
    check_name(&resource.name)?;
    validate_templates(resource)?;

    if resource.templates.is_empty() {
        debug!(resource = %resource.name, "no templates declared; skipping render");
        return Ok(MaterializeOutcome::Skipped);
    }

    let payload = serde_json::to_vec_pretty(&RenderedConfig {
        template: &resource.templates,
    })
    .map_err(|source| TemplateError::Serialize {
        resource: resource.name.clone(),
        source,
    })?;

    prepare_conf_dir(context, &run)?;

    let path = rendered_path(&resource.name, &context.conf_dir);
    let staged = context
        .conf_dir
        .join(format!(".{}.tmp-{}", resource.name, std::process::id()));
    if let Err(err) = stage_rendered(&staged, &payload, context, &run) {
        let _ = fs::remove_file(&staged);
        return Err(err);
    }
    if let Err(source) = fs::rename(&staged, &path) {
        let _ = fs::remove_file(&staged);
        return Err(TemplateError::io(&path, source));
    }

    info!(
        resource = %resource.name,
        path = %path.display(),
        templates = resource.templates.len(),
        "rendered template config"
    );
    Ok(MaterializeOutcome::Written {
        path,
        templates: resource.templates.len(),
    })
}

/// Deletes a rendered config file. Returns whether a file was removed.
pub fn remove_rendered(name: &str, conf_dir: &Path) -> Result<bool, TemplateError> {
    check_name(name)?;
    let path = rendered_path(name, conf_dir);
    match fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), "removed rendered template config");
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(TemplateError::io(path, source)),
    }
}

fn check_name(name: &str) -> Result<(), TemplateError> {
    validate_file_name("config file name", name).map_err(|err| TemplateError::InvalidName {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

fn validate_templates(resource: &TemplateResource) -> Result<(), TemplateError> {
    for (index, descriptor) in resource.templates.iter().enumerate() {
        for (field, value) in [
            ("source", &descriptor.source),
            ("destination", &descriptor.destination),
        ] {
            if value.as_deref().map_or(true, |value| value.trim().is_empty()) {
                return Err(TemplateError::MissingField {
                    field,
                    index,
                    resource: resource.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Creates a missing `conf_dir` and hands it to the service owner. An existing
/// directory is left as it is.
fn prepare_conf_dir<RunCommand>(
    context: &RenderContext,
    run: &RunCommand,
) -> Result<(), TemplateError>
where
    RunCommand: Fn(&mut Command) -> anyhow::Result<()>,
{
    if context.conf_dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(&context.conf_dir)
        .map_err(|source| TemplateError::io(&context.conf_dir, source))?;
    debug!(conf_dir = %context.conf_dir.display(), "created template config directory");
    apply_mode_and_owner(&context.conf_dir, CONF_DIR_MODE, context, run)
}

fn stage_rendered<RunCommand>(
    staged: &Path,
    payload: &[u8],
    context: &RenderContext,
    run: &RunCommand,
) -> Result<(), TemplateError>
where
    RunCommand: Fn(&mut Command) -> anyhow::Result<()>,
{
    fs::write(staged, payload).map_err(|source| TemplateError::io(staged, source))?;
    apply_mode_and_owner(staged, context.mode, context, run)
}

fn apply_mode_and_owner<RunCommand>(
    path: &Path,
    mode: u32,
    context: &RenderContext,
    run: &RunCommand,
) -> Result<(), TemplateError>
where
    RunCommand: Fn(&mut Command) -> anyhow::Result<()>,
{
    if context.platform == Platform::Windows {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|source| TemplateError::io(path, source))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    if let Some(ownership) = &context.ownership {
        let mut command = Command::new("chown");
        command
            .arg(format!("{}:{}", ownership.user, ownership.group))
            .arg(path);
        run(&mut command).map_err(|source| TemplateError::Ownership {
            path: path.to_path_buf(),
            user: ownership.user.clone(),
            group: ownership.group.clone(),
            source,
        })?;
    }
    Ok(())
}

fn run_chown(command: &mut Command) -> anyhow::Result<()> {
    let output = command
        .output()
        .with_context(|| format!("failed to run {:?}", command.get_program()))?;
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!(
        "chown exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}
