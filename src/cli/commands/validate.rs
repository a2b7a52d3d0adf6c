//! Validate command - re-check the paths attached earlier in the job
//!
//! Always succeeds: every problem found is reported as a warning.

use crate::cache::modes::introspect::{CommandRunner, SystemRunner};
use crate::cache::{privileged_fs, Elevation, PostValidator, Strategy, StrategyChoice, ValidationReport};
use crate::cli::args::ValidateArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{VolcacheError, VolcacheResult};
use crate::host::{take_attached, take_strategy, HostPlatform, RunStateStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the validate phase against a state store.
///
/// Returns `None` when the attach phase left no state behind.
pub async fn validate(
    store: &dyn RunStateStore,
    strategy: StrategyChoice,
    elevate: Elevation,
    runner: Arc<dyn CommandRunner>,
) -> VolcacheResult<Option<ValidationReport>> {
    let Some(requests) = take_attached(store).await? else {
        return Ok(None);
    };

    // An explicit choice wins over what the attach phase recorded
    let recorded = take_strategy(store).await?;
    let strategy = Strategy::chosen(strategy)
        .or(recorded)
        .unwrap_or_else(Strategy::detect);
    debug!("Validating {} cache path(s) attached by {}", requests.len(), strategy);

    let home_dir = dirs::home_dir().ok_or(VolcacheError::HomeDirUnknown)?;
    let validator = PostValidator::new(strategy, privileged_fs(elevate, runner), home_dir);
    Ok(Some(validator.validate(&requests).await))
}

/// Execute the validate command
pub async fn execute(args: ValidateArgs, config: &Config) -> VolcacheResult<()> {
    let host = HostPlatform::detect();
    let state_dir = args.state_dir.unwrap_or_else(ConfigManager::state_dir);
    let store = host.state_store(&state_dir);
    let strategy = args.strategy.unwrap_or(config.cache.strategy);
    let elevate = args.elevate.unwrap_or(config.cache.elevate);
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());

    match validate(store.as_ref(), strategy, elevate, runner).await {
        Ok(Some(report)) => {
            if !report.found_problems() {
                info!("All {} cache path(s) still attached", report.cached.len() + report.wiped.len());
            }
        }
        Ok(None) => warn!("No attached cache paths recorded for this job; was `volcache attach` run?"),
        Err(e) => warn!("Could not validate cache paths: {}", e),
    }
    Ok(())
}
