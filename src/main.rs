//! volcache - persistent cache volumes for ephemeral CI jobs
//!
//! CLI entry point that dispatches to the two phase subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::warn;
use volcache::cli::{AttachArgs, Cli, Commands};
use volcache::config::{Config, ConfigManager};
use volcache::error::{VolcacheError, VolcacheResult};
use volcache::host::HostPlatform;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> VolcacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => {
            let cwd = match cli.command {
                Commands::Attach(AttachArgs {
                    working_dir: Some(ref dir),
                    ..
                }) => dir.clone(),
                _ => std::env::current_dir()
                    .map_err(|e| VolcacheError::io("getting current directory", e))?,
            };
            ConfigManager::discover(&cwd)
        }
    };

    let loaded = config_manager.load().await;
    let log_format = cli.log_format.unwrap_or_else(|| match loaded {
        Ok(ref config) => config.general.log_format,
        Err(_) => Default::default(),
    });
    volcache::logging::init(cli.verbose, log_format, HostPlatform::detect().is_github());

    match cli.command {
        Commands::Attach(args) => {
            let config = loaded?;
            volcache::cli::commands::attach(args, &config).await
        }
        Commands::Validate(args) => {
            // The validate phase never fails the job
            let config = loaded.unwrap_or_else(|e| {
                warn!("{}; using defaults", e);
                Config::default()
            });
            volcache::cli::commands::validate(args, &config).await
        }
    }
}
