//! CLI argument definitions using clap derive

use crate::cache::{Elevation, StrategyChoice};
use crate::logging::LogFormat;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// volcache - persistent cache volumes for ephemeral CI jobs
///
/// Attaches build-tool caches from a persistent volume at the start of a
/// job and checks them again once the job's build steps are done.
#[derive(Parser, Debug)]
#[command(name = "volcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "VOLCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve cache paths and attach them from the cache volume
    Attach(AttachArgs),

    /// Check that the paths attached earlier in this job are still in place
    Validate(ValidateArgs),
}

/// Arguments for the attach command
#[derive(Parser, Debug, Default)]
pub struct AttachArgs {
    /// Manual cache paths (repeatable, comma-separated)
    #[arg(long = "path", value_delimiter = ',', env = "VOLCACHE_PATHS")]
    pub paths: Vec<String>,

    /// Cache modes such as go, pnpm, rust (repeatable, comma-separated)
    #[arg(long = "mode", value_delimiter = ',', env = "VOLCACHE_MODES")]
    pub modes: Vec<String>,

    /// Add modes detected from project marker files
    #[arg(long, env = "VOLCACHE_DETECT")]
    pub detect: bool,

    /// Fail when any cache path was not found in the volume
    #[arg(long, env = "VOLCACHE_FAIL_ON_CACHE_MISS")]
    pub fail_on_cache_miss: bool,

    /// Root of the cache volume
    #[arg(long, env = "VOLCACHE_ROOT")]
    pub volume_root: Option<PathBuf>,

    /// Attachment strategy
    #[arg(long, value_enum, env = "VOLCACHE_STRATEGY")]
    pub strategy: Option<StrategyChoice>,

    /// Privilege elevation for filesystem steps
    #[arg(long, value_enum, env = "VOLCACHE_ELEVATE")]
    pub elevate: Option<Elevation>,

    /// Directory for run state outside GitHub Actions
    #[arg(long, env = "VOLCACHE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Base directory for workspace-relative paths (defaults to current directory)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Default)]
pub struct ValidateArgs {
    /// Attachment strategy used by the attach phase
    #[arg(long, value_enum, env = "VOLCACHE_STRATEGY")]
    pub strategy: Option<StrategyChoice>,

    /// Privilege elevation for filesystem steps
    #[arg(long, value_enum, env = "VOLCACHE_ELEVATE")]
    pub elevate: Option<Elevation>,

    /// Directory for run state outside GitHub Actions
    #[arg(long, env = "VOLCACHE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}
