//! Integration with the CI host running the job
//!
//! On GitHub Actions, outputs, environment overrides and run state go
//! through the runner's file commands. Anywhere else outputs are only
//! logged and run state is kept in a local file.

pub mod github;
pub mod state;

pub use state::{
    save_attached, save_strategy, take_attached, take_strategy, FileStateStore,
    GithubStateStore, MemoryStateStore, RunStateStore, ATTACHED_PATHS_KEY,
};

use crate::error::VolcacheResult;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where the job is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPlatform {
    /// GitHub Actions, with the paths of its file commands
    GithubActions {
        output: Option<PathBuf>,
        env: Option<PathBuf>,
        state: Option<PathBuf>,
    },
    /// Local shell or a CI system without file commands
    Local,
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl HostPlatform {
    /// Detect the current host
    pub fn detect() -> Self {
        if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
            HostPlatform::GithubActions {
                output: env_path("GITHUB_OUTPUT"),
                env: env_path("GITHUB_ENV"),
                state: env_path("GITHUB_STATE"),
            }
        } else {
            HostPlatform::Local
        }
    }

    pub fn is_github(&self) -> bool {
        matches!(self, HostPlatform::GithubActions { .. })
    }

    /// Publish a step output
    pub async fn set_output(&self, name: &str, value: &str) -> VolcacheResult<()> {
        match self {
            HostPlatform::GithubActions {
                output: Some(file), ..
            } => github::append_command(file, name, value).await,
            _ => {
                info!("Output {}={}", name, value);
                Ok(())
            }
        }
    }

    /// Apply environment overrides to this process and to later job steps
    pub async fn export_env(&self, overrides: &[(String, String)]) -> VolcacheResult<()> {
        for (key, value) in overrides {
            debug!("Setting {}={}", key, value);
            std::env::set_var(key, value);

            if let HostPlatform::GithubActions { env: Some(file), .. } = self {
                github::append_command(file, key, value).await?;
            }
        }

        if !overrides.is_empty() && !self.is_github() {
            warn!(
                "Environment overrides apply to this process only; export them for later steps: {}",
                overrides
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }
        Ok(())
    }

    /// Run-state store for this host
    pub fn state_store(&self, state_dir: &Path) -> Box<dyn RunStateStore> {
        match self {
            HostPlatform::GithubActions {
                state: Some(file), ..
            } => Box::new(GithubStateStore::new(file.clone())),
            _ => Box::new(FileStateStore::for_current_job(state_dir)),
        }
    }
}
