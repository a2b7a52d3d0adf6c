//! Deterministic mapping from mount targets to cache-side paths
//!
//! The expanded absolute mount target is nested verbatim under the volume
//! root (`/tmp/mydata` -> `<root>/tmp/mydata`), so distinct absolute paths
//! never share a cache-side directory and repeated jobs land on the same one.

use crate::cache::request::CachePathRequest;
use crate::error::{VolcacheError, VolcacheResult};
use std::path::{Component, Path, PathBuf};

/// Home-relative marker accepted at the start of a mount target
pub const HOME_MARKER: &str = "~";

/// Expand a leading `~` using the given home directory
pub fn expand_home(target: &str, home: &Path) -> PathBuf {
    if target == HOME_MARKER {
        return home.to_path_buf();
    }
    match target.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(target),
    }
}

/// Lexically normalize an absolute path (`.` dropped, `..` popped)
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Maps mount targets onto the cache volume
#[derive(Debug, Clone)]
pub struct PathMapper {
    volume_root: PathBuf,
    home_dir: PathBuf,
}

impl PathMapper {
    /// Create a mapper for a volume root and the invoking user's home
    pub fn new(volume_root: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        Self {
            volume_root: volume_root.into(),
            home_dir: home_dir.into(),
        }
    }

    /// Create a mapper using the current user's home directory
    pub fn for_current_user(volume_root: impl Into<PathBuf>) -> VolcacheResult<Self> {
        let home = dirs::home_dir().ok_or(VolcacheError::HomeDirUnknown)?;
        Ok(Self::new(volume_root, home))
    }

    /// Home directory used for `~` expansion
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Expand a mount target into the absolute live path
    pub fn live_path(&self, mount_target: &str) -> PathBuf {
        expand_home(mount_target, &self.home_dir)
    }

    /// Compute the cache-side path for a mount target
    pub fn cache_path_for(&self, mount_target: &str) -> VolcacheResult<PathBuf> {
        if mount_target.is_empty() {
            return Err(VolcacheError::PathInvalid {
                path: PathBuf::new(),
                reason: "mount target is empty".to_string(),
            });
        }

        let expanded = self.live_path(mount_target);
        if !expanded.is_absolute() {
            return Err(VolcacheError::PathInvalid {
                path: expanded,
                reason: "mount target must be absolute or home-relative".to_string(),
            });
        }

        let normalized = normalize(&expanded);
        let relative = normalized.strip_prefix("/").unwrap_or(&normalized);
        Ok(self.volume_root.join(relative))
    }

    /// Fill in `cache_path` for one request
    pub fn map(&self, mut request: CachePathRequest) -> VolcacheResult<CachePathRequest> {
        request.cache_path = self.cache_path_for(&request.mount_target)?;
        Ok(request)
    }

    /// Fill in `cache_path` for every request, preserving order
    pub fn map_all(&self, requests: Vec<CachePathRequest>) -> VolcacheResult<Vec<CachePathRequest>> {
        requests.into_iter().map(|r| self.map(r)).collect()
    }
}
