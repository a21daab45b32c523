mod completion;
mod dispatch;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use completion::CliCompletionShell;
use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "ctprov", version)]
#[command(about = "Installs and configures consul-template on a host", long_about = None)]
struct Cli {
    /// Path to the provisioning config (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Disable badges, sections and spinners.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct TargetArgs {
    /// Version to act on; overrides `version` from the config.
    #[arg(long = "version", value_name = "VERSION")]
    version: Option<String>,
    #[arg(long, value_name = "PATH")]
    install_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the requested version and prune every other installed version.
    Install(TargetArgs),
    /// Delete one installed version.
    Remove(TargetArgs),
    /// List installed versions.
    List {
        #[arg(long, value_name = "PATH")]
        install_root: Option<PathBuf>,
    },
    /// Write the declared consul-template config files.
    Render {
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a rendered config file.
    Unrender {
        #[arg(long)]
        name: String,
    },
    /// Print resolved paths and the archive URL.
    Paths(TargetArgs),
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    run_cli(cli)
}

fn init_tracing(verbose: u8, quiet: bool) {
    let directive = tracing_directive(verbose, quiet, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Status lines already report results, so logs stay at `warn` unless asked.
fn tracing_directive(verbose: u8, quiet: bool, rust_log: Option<String>) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => rust_log
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "warn".to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
