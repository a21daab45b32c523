use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use ctprov_core::{Platform, ProvisionConfig};
use ctprov_installer::{
    installation_provider, service_coordinator, Collaborators, EnsureOutcome, FsVersionStore,
    HttpArchiveFetcher, InstallationRequest, RemoveOutcome, RemoveStatus, VersionDirectory,
    VersionStore,
};
use ctprov_templates::{
    materialize, remove_rendered, rendered_path, MaterializeOutcome, RenderContext,
    TemplateResource,
};
use tracing::debug;

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::render::{
    current_output_style, render_status_line, OutputStyle, ProgressFetcher, TerminalRenderer,
};
use crate::{Cli, Commands, TargetArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::from_style(current_output_style(cli.plain));

    if let Commands::Completions { shell } = cli.command {
        let shell_env = std::env::var("SHELL").ok();
        let shell = resolve_completion_shell(shell, shell_env.as_deref(), cfg!(windows));
        return write_completions_script(shell, &mut std::io::stdout().lock());
    }

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Install(target) => {
            run_install(&apply_target_overrides(config, &target)?, renderer)
        }
        Commands::Remove(target) => {
            run_remove(&apply_target_overrides(config, &target)?, renderer)
        }
        Commands::List { install_root } => {
            let target = TargetArgs {
                version: None,
                install_root,
            };
            run_list(&apply_target_overrides(config, &target)?, renderer)
        }
        Commands::Render { name } => run_render(&config, name.as_deref(), renderer),
        Commands::Unrender { name } => run_unrender(&config, &name, renderer),
        Commands::Paths(target) => {
            let config = apply_target_overrides(config, &target)?;
            renderer.print_lines(&format_paths_lines(&config, renderer.style())?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

pub(crate) fn default_config_path(platform: Platform) -> PathBuf {
    match platform {
        Platform::Posix => PathBuf::from("/etc/ctprov/config.toml"),
        Platform::Windows => PathBuf::from(r"C:\ProgramData\ctprov\config.toml"),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<ProvisionConfig> {
    if let Some(path) = explicit {
        return ProvisionConfig::load(path);
    }
    let default_path = default_config_path(Platform::host());
    if default_path.is_file() {
        return ProvisionConfig::load(&default_path);
    }
    debug!(path = %default_path.display(), "no config file found; using defaults");
    Ok(ProvisionConfig::default())
}

pub(crate) fn apply_target_overrides(
    mut config: ProvisionConfig,
    target: &TargetArgs,
) -> Result<ProvisionConfig> {
    if let Some(version) = &target.version {
        config.version = Some(version.clone());
    }
    if let Some(install_root) = &target.install_root {
        config.install_root = Some(install_root.clone());
    }
    config.validate()?;
    Ok(config)
}

fn run_install(config: &ProvisionConfig, renderer: TerminalRenderer) -> Result<()> {
    let request = InstallationRequest::from_config(config, None)?;
    let store = FsVersionStore;
    let fetcher = ProgressFetcher::new(
        HttpArchiveFetcher::new(config.resolved_cache_dir())
            .with_timeout(Duration::from_secs(config.download_timeout_secs))
            .with_expected_sha256(config.archive_sha256.clone()),
        renderer,
    );
    let service = service_coordinator(config.service_kind(), config.service_name());
    let provider = installation_provider(
        config.platform,
        Collaborators {
            store: &store,
            fetcher: &fetcher,
            service: service.as_ref(),
        },
    );

    let outcome = provider.ensure(&request)?;
    renderer.print_section(&format!("{} {}", config.tool_name, outcome.version));
    renderer.print_lines(&format_ensure_outcome_lines(
        &config.tool_name,
        &outcome,
        renderer.style(),
    ));
    Ok(())
}

fn run_remove(config: &ProvisionConfig, renderer: TerminalRenderer) -> Result<()> {
    let request = InstallationRequest::from_config(config, None)?;
    let store = FsVersionStore;
    let fetcher = HttpArchiveFetcher::new(config.resolved_cache_dir());
    let service = service_coordinator(config.service_kind(), config.service_name());
    let provider = installation_provider(
        config.platform,
        Collaborators {
            store: &store,
            fetcher: &fetcher,
            service: service.as_ref(),
        },
    );

    let outcome = provider.remove(&request)?;
    println!(
        "{}",
        format_remove_outcome_line(&config.tool_name, &outcome, renderer.style())
    );
    Ok(())
}

fn run_list(config: &ProvisionConfig, renderer: TerminalRenderer) -> Result<()> {
    let install_root = config.resolved_install_root();
    let versions = FsVersionStore.list(&install_root)?;
    renderer.print_lines(&format_list_lines(
        &install_root,
        &versions,
        config.version.as_deref(),
        renderer.style(),
    ));
    Ok(())
}

fn run_render(
    config: &ProvisionConfig,
    name: Option<&str>,
    renderer: TerminalRenderer,
) -> Result<()> {
    let selected: Vec<_> = match name {
        Some(name) => vec![config
            .config_file(name)
            .ok_or_else(|| anyhow!("no config file named '{name}' is declared"))?],
        None => config.config_files.iter().collect(),
    };
    if selected.is_empty() {
        renderer.print_status("warn", "no config files declared; nothing to render");
        return Ok(());
    }

    let context = RenderContext::from_config(config)?;
    for config_file in selected {
        let resource = TemplateResource::from(config_file);
        let outcome = materialize(&resource, &context)?;
        println!(
            "{}",
            format_materialize_line(&resource.name, &outcome, renderer.style())
        );
    }
    Ok(())
}

fn run_unrender(config: &ProvisionConfig, name: &str, renderer: TerminalRenderer) -> Result<()> {
    let conf_dir = config.resolved_conf_dir();
    let removed = remove_rendered(name, &conf_dir)?;
    let path = rendered_path(name, &conf_dir);
    if removed {
        renderer.print_status("ok", &format!("removed {}", path.display()));
    } else {
        renderer.print_status("ok", &format!("{} was not present", path.display()));
    }
    Ok(())
}

pub(crate) fn format_ensure_outcome_lines(
    tool_name: &str,
    outcome: &EnsureOutcome,
    style: OutputStyle,
) -> Vec<String> {
    let headline = if outcome.fetched {
        format!("installed {tool_name} {}", outcome.version)
    } else {
        format!("{tool_name} {} already installed", outcome.version)
    };
    let mut lines = vec![
        render_status_line(style, "ok", &headline),
        render_status_line(
            style,
            "step",
            &format!("program: {}", outcome.program_path.display()),
        ),
    ];

    if outcome.fetched {
        lines.push(render_status_line(
            style,
            "step",
            &format!("archive: {}", outcome.archive_url),
        ));
    }
    if outcome.service_stopped {
        lines.push(render_status_line(
            style,
            "step",
            "service stopped before pruning",
        ));
    }
    if !outcome.pruned.is_empty() {
        lines.push(render_status_line(
            style,
            "step",
            &format!("pruned: {}", outcome.pruned.join(", ")),
        ));
    }
    for failure in &outcome.prune_failures {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "warning: failed to prune {} at {}: {}",
                failure.version,
                failure.path.display(),
                failure.message
            ),
        ));
    }

    lines
}

pub(crate) fn format_remove_outcome_line(
    tool_name: &str,
    outcome: &RemoveOutcome,
    style: OutputStyle,
) -> String {
    match outcome.status {
        RemoveStatus::Removed => render_status_line(
            style,
            "ok",
            &format!(
                "removed {tool_name} {} from {}",
                outcome.version,
                outcome.path.display()
            ),
        ),
        RemoveStatus::NotInstalled => render_status_line(
            style,
            "ok",
            &format!("{tool_name} {} is not installed", outcome.version),
        ),
    }
}

pub(crate) fn format_list_lines(
    install_root: &Path,
    versions: &[VersionDirectory],
    configured: Option<&str>,
    style: OutputStyle,
) -> Vec<String> {
    if versions.is_empty() {
        return vec![render_status_line(
            style,
            "warn",
            &format!("no versions installed under {}", install_root.display()),
        )];
    }
    versions
        .iter()
        .map(|entry| {
            let marker = if configured == Some(entry.version.as_str()) {
                "*"
            } else {
                " "
            };
            format!("{marker} {}", entry.version)
        })
        .collect()
}

pub(crate) fn format_materialize_line(
    name: &str,
    outcome: &MaterializeOutcome,
    style: OutputStyle,
) -> String {
    match outcome {
        MaterializeOutcome::Skipped => render_status_line(
            style,
            "step",
            &format!("{name}: no templates declared; skipped"),
        ),
        MaterializeOutcome::Written { path, templates } => render_status_line(
            style,
            "ok",
            &format!("{name}: wrote {templates} template(s) to {}", path.display()),
        ),
    }
}

pub(crate) fn format_paths_lines(
    config: &ProvisionConfig,
    style: OutputStyle,
) -> Result<Vec<String>> {
    let service = match config.service_kind() {
        Some(kind) => format!("{} ({})", config.service_name(), kind.as_str()),
        None => "unmanaged".to_string(),
    };
    let mut lines = vec![
        render_status_line(
            style,
            "step",
            &format!("install_root: {}", config.resolved_install_root().display()),
        ),
        render_status_line(
            style,
            "step",
            &format!("conf_dir: {}", config.resolved_conf_dir().display()),
        ),
        render_status_line(
            style,
            "step",
            &format!("cache_dir: {}", config.resolved_cache_dir().display()),
        ),
        render_status_line(style, "step", &format!("service: {service}")),
    ];

    if config.version.is_some() {
        let request = InstallationRequest::from_config(config, None)?;
        lines.push(render_status_line(
            style,
            "step",
            &format!("program: {}", request.program_path().display()),
        ));
        lines.push(render_status_line(
            style,
            "step",
            &format!("archive: {}", request.archive_url()),
        ));
    }
    Ok(lines)
}
