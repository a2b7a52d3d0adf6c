//! Attach command - resolve cache paths and attach them from the volume

use crate::cache::modes::introspect::{CommandRunner, SystemRunner};
use crate::cache::{
    detect_modes, privileged_fs, AttachReport, Attacher, CacheRequestResolver, CacheVolume,
    DiskUsage, Elevation, MetadataStore, PathMapper, ResolveInput, Strategy, StrategyChoice,
};
use crate::cli::args::AttachArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{VolcacheError, VolcacheResult};
use crate::host::{save_attached, save_strategy, HostPlatform, RunStateStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Attach settings after merging CLI, environment and config file
#[derive(Debug, Clone, PartialEq)]
pub struct AttachSettings {
    pub paths: Vec<String>,
    pub modes: Vec<String>,
    pub detect: bool,
    pub fail_on_cache_miss: bool,
    pub volume_root: Option<PathBuf>,
    pub strategy: StrategyChoice,
    pub elevate: Elevation,
    pub state_dir: PathBuf,
    pub working_dir: PathBuf,
}

impl AttachSettings {
    /// Merge arguments over the config file. Lists given on the command
    /// line replace the file's lists.
    pub fn merge(args: AttachArgs, config: &Config, working_dir: PathBuf) -> Self {
        let cache = &config.cache;
        let pick = |cli: Vec<String>, file: &Vec<String>| {
            if cli.is_empty() {
                file.clone()
            } else {
                cli
            }
        };

        Self {
            paths: pick(args.paths, &cache.paths),
            modes: pick(args.modes, &cache.modes),
            detect: args.detect || cache.detect,
            fail_on_cache_miss: args.fail_on_cache_miss || cache.fail_on_cache_miss,
            volume_root: args.volume_root,
            strategy: args.strategy.unwrap_or(cache.strategy),
            elevate: args.elevate.unwrap_or(cache.elevate),
            state_dir: args.state_dir.unwrap_or_else(ConfigManager::state_dir),
            working_dir,
        }
    }
}

/// Explicit modes followed by detected ones, without duplicates.
///
/// With nothing requested at all, detection is used.
pub fn select_modes(settings: &AttachSettings) -> Vec<String> {
    let mut modes: Vec<String> = Vec::new();
    for mode in settings.modes.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        if !modes.iter().any(|m| m == mode) {
            modes.push(mode.to_string());
        }
    }

    let nothing_requested = modes.is_empty() && settings.paths.iter().all(|p| p.trim().is_empty());
    if settings.detect || nothing_requested {
        if nothing_requested && !settings.detect {
            info!("No cache modes or paths given, detecting modes");
        }
        for mode in detect_modes(&settings.working_dir) {
            if !modes.iter().any(|m| m == mode) {
                modes.push(mode.to_string());
            }
        }
    }

    modes
}

/// Everything the attach phase did
#[derive(Debug)]
pub struct AttachOutcome {
    pub volume: CacheVolume,
    pub modes: Vec<String>,
    pub strategy: Strategy,
    pub report: AttachReport,
}

/// Run the attach phase against a host, a command runner and a state store
pub async fn attach(
    settings: &AttachSettings,
    host: &HostPlatform,
    runner: Arc<dyn CommandRunner>,
    store: &dyn RunStateStore,
) -> VolcacheResult<AttachOutcome> {
    let volume = CacheVolume::locate(settings.volume_root.as_deref())?;
    let mapper = PathMapper::for_current_user(volume.root())?;

    let modes = select_modes(settings);
    let input = ResolveInput {
        paths: settings.paths.clone(),
        modes: modes.clone(),
    };
    let resolution =
        CacheRequestResolver::new(mapper.clone(), runner.clone(), settings.working_dir.clone())
            .resolve(&input)
            .await?;

    host.export_env(&resolution.env_overrides).await?;

    let strategy = Strategy::select(settings.strategy);
    let attacher = Attacher::new(strategy, privileged_fs(settings.elevate, runner), mapper);
    let report = attacher.attach_all(&resolution.requests).await?;

    MetadataStore::new(volume.root()).record(&report.attached).await;

    save_attached(store, &report.attached).await?;
    save_strategy(store, strategy).await?;
    host.set_output("cache-hit", &report.cache_hit().to_string())
        .await?;

    Ok(AttachOutcome {
        volume,
        modes,
        strategy,
        report,
    })
}

fn print_summary(outcome: &AttachOutcome) {
    if outcome.modes.is_empty() {
        info!("Cache modes: none");
    } else {
        info!("Cache modes: {}", outcome.modes.join(", "));
    }
    info!("Attached {} cache path(s)", outcome.report.attached.len());

    if outcome.report.cache_hit() {
        info!("All cache paths found and restored");
    } else {
        info!("Some cache paths missing: {}", outcome.report.misses.join(", "));
    }

    match DiskUsage::of(outcome.volume.root()) {
        Ok(usage) => info!("Cache volume: {}", usage),
        Err(e) => debug!("Disk usage unavailable: {}", e),
    }
}

fn working_dir(args: &AttachArgs) -> VolcacheResult<PathBuf> {
    match args.working_dir {
        Some(ref dir) => Ok(dir.clone()),
        None => std::env::current_dir().map_err(|e| VolcacheError::io("getting current directory", e)),
    }
}

/// Execute the attach command
pub async fn execute(args: AttachArgs, config: &Config) -> VolcacheResult<()> {
    let working_dir = working_dir(&args)?;
    let settings = AttachSettings::merge(args, config, working_dir);
    debug!("Attach settings: {:?}", settings);

    let host = HostPlatform::detect();
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::in_dir(&settings.working_dir));
    let store = host.state_store(&settings.state_dir);

    let outcome = attach(&settings, &host, runner, store.as_ref()).await?;
    print_summary(&outcome);

    if settings.fail_on_cache_miss && !outcome.report.cache_hit() {
        return Err(VolcacheError::CacheMiss(outcome.report.misses.join(", ")));
    }
    Ok(())
}
