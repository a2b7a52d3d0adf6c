//! Attaching cache-side directories at their mount targets
//!
//! One strategy is chosen for the whole run. Requests are attached strictly
//! in order, so when two requests share a mount target the later one wins.
//! Any failing filesystem step aborts the run with that step's error; a
//! half-finished mount or symlink swap is never retried.

use crate::cache::mapper::PathMapper;
use crate::cache::privileged::PrivilegedFs;
use crate::cache::request::CachePathRequest;
use crate::error::VolcacheResult;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Requested attachment strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Pick from OS capability
    #[default]
    Auto,
    Symlink,
    BindMount,
}

/// How cache-side directories are made visible at mount targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Replace the mount target with a symlink into the volume
    Symlink,
    /// Bind-mount the cache-side directory over the mount target
    BindMount,
}

impl Strategy {
    /// Detect the strategy for the current OS.
    ///
    /// Bind mounts need Linux; elsewhere symlinks are used, which can be
    /// re-checked after the job with `lstat`.
    pub fn detect() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    /// Strategy for a given OS name
    pub fn for_os(os: &str) -> Self {
        match os {
            "linux" => Strategy::BindMount,
            _ => Strategy::Symlink,
        }
    }

    /// Resolve a user choice into a concrete strategy
    pub fn select(choice: StrategyChoice) -> Self {
        Self::chosen(choice).unwrap_or_else(Self::detect)
    }

    /// The strategy named by an explicit choice, `None` for auto
    pub fn chosen(choice: StrategyChoice) -> Option<Self> {
        match choice {
            StrategyChoice::Auto => None,
            StrategyChoice::Symlink => Some(Strategy::Symlink),
            StrategyChoice::BindMount => Some(Strategy::BindMount),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Symlink => "symlink",
            Strategy::BindMount => "bind mount",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of attaching a request list
#[derive(Debug, Clone, Default)]
pub struct AttachReport {
    /// Requests attached, in order
    pub attached: Vec<CachePathRequest>,
    /// Mount targets whose cache-side directory did not exist yet
    pub misses: Vec<String>,
    /// Advisory warnings about pre-existing content
    pub advisories: Vec<String>,
}

impl AttachReport {
    /// True when every request found existing cache contents
    pub fn cache_hit(&self) -> bool {
        self.misses.is_empty()
    }
}

/// Whether a mount target already holds something worth warning about
async fn has_meaningful_content(target: &Path, cache_path: &Path) -> bool {
    let meta = match fs::symlink_metadata(target).await {
        Ok(meta) => meta,
        Err(_) => return false,
    };

    if meta.file_type().is_symlink() {
        if fs::read_link(target).await.ok().as_deref() == Some(cache_path) {
            return false;
        }
        return match fs::metadata(target).await {
            Ok(resolved) if resolved.is_dir() => dir_has_entries(target).await,
            _ => false,
        };
    }

    if meta.is_dir() {
        return dir_has_entries(target).await;
    }

    meta.is_file()
}

async fn dir_has_entries(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// Attaches requests using one strategy
pub struct Attacher {
    strategy: Strategy,
    fs: Box<dyn PrivilegedFs>,
    mapper: PathMapper,
}

impl Attacher {
    pub fn new(strategy: Strategy, fs: Box<dyn PrivilegedFs>, mapper: PathMapper) -> Self {
        Self {
            strategy,
            fs,
            mapper,
        }
    }

    /// Attach every request in order, stopping at the first failure
    pub async fn attach_all(&self, requests: &[CachePathRequest]) -> VolcacheResult<AttachReport> {
        let mut report = AttachReport::default();
        info!(
            "Attaching {} cache path(s) using {}",
            requests.len(),
            self.strategy
        );

        for request in requests {
            if let Err(e) = self.attach_one(request, &mut report).await {
                error!("Attaching {} failed", request.mount_target);
                return Err(e);
            }
            report.attached.push(request.clone());
        }

        Ok(report)
    }

    async fn attach_one(
        &self,
        request: &CachePathRequest,
        report: &mut AttachReport,
    ) -> VolcacheResult<()> {
        let cache_path = request.cache_path.as_path();
        let target = self.mapper.live_path(&request.mount_target);

        let miss = !fs::try_exists(cache_path).await.unwrap_or(false);
        if miss {
            report.misses.push(request.mount_target.clone());
        }

        if request.wipe && !miss {
            debug!("Wiping {}", cache_path.display());
            self.fs.remove_all(cache_path).await?;
        }

        self.fs.create_dir_all(cache_path).await?;
        if miss || request.wipe {
            self.fs.chown_to_invoker(cache_path).await?;
        }

        match self.strategy {
            Strategy::BindMount => self.bind(cache_path, &target).await?,
            Strategy::Symlink => self.link(request, cache_path, &target, report).await?,
        }

        info!(
            "{}: {} ({})",
            request.mount_target,
            if miss { "cache miss" } else { "cache hit" },
            self.strategy
        );
        Ok(())
    }

    async fn bind(&self, cache_path: &Path, target: &Path) -> VolcacheResult<()> {
        if let Ok(meta) = fs::symlink_metadata(target).await {
            if !meta.file_type().is_dir() {
                debug!("Removing non-directory at {}", target.display());
                self.fs.remove_all(target).await?;
            }
        }

        self.fs.create_dir_all(target).await?;
        self.fs.bind_mount(cache_path, target).await
    }

    async fn link(
        &self,
        request: &CachePathRequest,
        cache_path: &Path,
        target: &Path,
        report: &mut AttachReport,
    ) -> VolcacheResult<()> {
        if request.is_custom() && has_meaningful_content(target, cache_path).await {
            let advisory = format!(
                "{}: existing contents will be replaced by the cache volume link",
                request.mount_target
            );
            warn!("{}", advisory);
            report.advisories.push(advisory);
        }

        if let Some(parent) = target.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        self.fs.replace_with_symlink(cache_path, target).await?;
        self.fs.chown_to_invoker(target).await
    }
}
