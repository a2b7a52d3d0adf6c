//! Configuration management for volcache

pub mod schema;

pub use schema::Config;

use crate::error::{VolcacheError, VolcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the project-local config file
pub const LOCAL_CONFIG_FILE: &str = ".volcache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Config manager that discovers `.volcache.toml` in `working_dir`
    pub fn discover(working_dir: &Path) -> Self {
        let candidate = working_dir.join(LOCAL_CONFIG_FILE);
        let config_path = candidate.is_file().then_some(candidate);
        if let Some(ref path) = config_path {
            debug!("Found local config: {}", path.display());
        }
        Self { config_path }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: Some(path),
        }
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("volcache")
    }

    /// Load configuration, falling back to defaults without a file
    pub async fn load(&self) -> VolcacheResult<Config> {
        match self.config_path {
            Some(ref path) => Self::load_from_file(path).await,
            None => {
                debug!("No config file, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(path: &Path) -> VolcacheResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| VolcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| VolcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path, if any
    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
