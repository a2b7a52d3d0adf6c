//! Cache path requests and the cache volume they live in

use crate::error::{VolcacheError, VolcacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Framework tag carried by manually supplied paths
pub const CUSTOM_FRAMEWORK: &str = "custom";

/// Drop trailing separators so the target names the entry itself.
///
/// `ws/data/` would otherwise resolve through a symlink placed at `ws/data`,
/// and a rename onto it fails. The root and a bare `~` are kept.
fn trim_target(target: String) -> String {
    let trimmed = target.trim_end_matches('/');
    if trimmed.len() == target.len() {
        target
    } else if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A single host path that should be backed by the cache volume.
///
/// `cache_path` is empty until the [`PathMapper`](super::PathMapper) fills it
/// in; it always derives from `mount_target`, the volume root and the home
/// directory, so two runs with the same inputs agree on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePathRequest {
    /// Path in the job filesystem, possibly starting with `~`
    pub mount_target: String,

    /// Mode tag that produced this request
    pub framework: String,

    /// Clear the cache-side directory before use and after the job
    #[serde(default)]
    pub wipe: bool,

    /// Location inside the cache volume
    #[serde(default)]
    pub cache_path: PathBuf,
}

impl CachePathRequest {
    /// Create a request for a mount target produced by a mode
    pub fn new(mount_target: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            mount_target: trim_target(mount_target.into()),
            framework: framework.into(),
            wipe: false,
            cache_path: PathBuf::new(),
        }
    }

    /// Create a request for a manually supplied path
    pub fn custom(mount_target: impl Into<String>) -> Self {
        Self::new(mount_target, CUSTOM_FRAMEWORK)
    }

    /// Mark the request as workspace-scoped (wiped before and after use)
    pub fn wiped(mut self) -> Self {
        self.wipe = true;
        self
    }

    /// Whether the request came from a manual path
    pub fn is_custom(&self) -> bool {
        self.framework == CUSTOM_FRAMEWORK
    }
}

impl fmt::Display for CachePathRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mount_target, self.framework)
    }
}

/// The externally provisioned cache volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVolume {
    root: PathBuf,
}

impl CacheVolume {
    /// Locate the cache volume from the configured root.
    ///
    /// A missing setting or a root that does not exist is fatal; this is
    /// checked once, before any resolution starts.
    pub fn locate(root: Option<&Path>) -> VolcacheResult<Self> {
        let root = match root {
            Some(root) if !root.as_os_str().is_empty() => root,
            _ => return Err(VolcacheError::CacheVolumeMissing),
        };

        if !root.is_dir() {
            return Err(VolcacheError::CacheVolumeNotFound(root.to_path_buf()));
        }

        info!("Found cross-invocation cache volume at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Root directory of the volume
    pub fn root(&self) -> &Path {
        &self.root
    }
}
