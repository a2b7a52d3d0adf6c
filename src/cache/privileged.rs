//! Filesystem steps that may need elevated privileges
//!
//! The volume root and most mount targets outside the workspace are owned
//! by root. Each step is a discrete operation: with `sudo` it is a separate
//! external command, otherwise it runs in-process. A failing step is fatal
//! to the attachment that issued it and is never retried.

use crate::cache::modes::introspect::{command_line, CommandRunner};
use crate::cache::sys;
use crate::error::{VolcacheError, VolcacheResult};
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// How privileged steps are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// `sudo` unless already running as root
    #[default]
    Auto,
    /// Always prefix privileged commands with `sudo`
    Sudo,
    /// Run everything in-process as the current user
    Never,
}

/// Uid and gid of the user the job runs as, even when invoked through sudo
pub fn invoking_user() -> (u32, u32) {
    let from_env = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u32>().ok());
    let (uid, gid) = sys::real_ids();
    (
        from_env("SUDO_UID").unwrap_or(uid),
        from_env("SUDO_GID").unwrap_or(gid),
    )
}

/// Temporary sibling name used for an atomic symlink swap
fn swap_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.volcache-{}", name, uuid::Uuid::new_v4().simple()))
}

/// Whether `path` is a real directory (not a symlink to one)
async fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .await
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

/// Privileged filesystem operations used by attachment and validation
#[async_trait]
pub trait PrivilegedFs: Send + Sync {
    /// Create a directory and its parents
    async fn create_dir_all(&self, path: &Path) -> VolcacheResult<()>;

    /// Remove a file, symlink or directory tree; missing paths are fine
    async fn remove_all(&self, path: &Path) -> VolcacheResult<()>;

    /// Bind-mount `source` onto the existing directory `target`
    async fn bind_mount(&self, source: &Path, target: &Path) -> VolcacheResult<()>;

    /// Atomically make `target` a symlink to `source`
    async fn replace_with_symlink(&self, source: &Path, target: &Path) -> VolcacheResult<()>;

    /// Give `path` (not what it points to) back to the invoking user
    async fn chown_to_invoker(&self, path: &Path) -> VolcacheResult<()>;
}

/// Pick the implementation for the requested elevation
pub fn privileged_fs(elevation: Elevation, runner: Arc<dyn CommandRunner>) -> Box<dyn PrivilegedFs> {
    let sudo = match elevation {
        Elevation::Auto => !sys::is_root(),
        Elevation::Sudo => true,
        Elevation::Never => false,
    };

    if sudo {
        debug!("Privileged steps run through sudo");
        Box::new(SudoFs::new(runner))
    } else {
        debug!("Privileged steps run in-process");
        Box::new(DirectFs::new(runner))
    }
}

/// Runs each privileged step as a `sudo` command
pub struct SudoFs {
    runner: Arc<dyn CommandRunner>,
}

impl SudoFs {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn sudo(&self, args: &[&str]) -> VolcacheResult<()> {
        let output = self.runner.run("sudo", args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(VolcacheError::privileged(
                command_line("sudo", args),
                output.stderr.trim(),
            ))
        }
    }
}

#[async_trait]
impl PrivilegedFs for SudoFs {
    async fn create_dir_all(&self, path: &Path) -> VolcacheResult<()> {
        let path = path.to_string_lossy();
        self.sudo(&["mkdir", "-p", path.as_ref()]).await
    }

    async fn remove_all(&self, path: &Path) -> VolcacheResult<()> {
        let path = path.to_string_lossy();
        self.sudo(&["rm", "-rf", path.as_ref()]).await
    }

    async fn bind_mount(&self, source: &Path, target: &Path) -> VolcacheResult<()> {
        if std::env::consts::OS != "linux" {
            return Err(VolcacheError::BindMountUnsupported(
                std::env::consts::OS.to_string(),
            ));
        }
        let source = source.to_string_lossy();
        let target = target.to_string_lossy();
        self.sudo(&["mount", "--bind", source.as_ref(), target.as_ref()])
            .await
    }

    async fn replace_with_symlink(&self, source: &Path, target: &Path) -> VolcacheResult<()> {
        if is_real_dir(target).await {
            self.remove_all(target).await?;
        }

        let tmp = swap_path(target);
        let tmp = tmp.to_string_lossy();
        let source = source.to_string_lossy();
        let target = target.to_string_lossy();
        self.sudo(&["ln", "-s", source.as_ref(), tmp.as_ref()]).await?;

        // Do not descend into `target` when it is a symlink to a directory
        let no_follow = if std::env::consts::OS == "linux" { "-fT" } else { "-fh" };
        self.sudo(&["mv", no_follow, tmp.as_ref(), target.as_ref()])
            .await
    }

    async fn chown_to_invoker(&self, path: &Path) -> VolcacheResult<()> {
        let (uid, gid) = invoking_user();
        let owner = format!("{}:{}", uid, gid);
        let path = path.to_string_lossy();
        self.sudo(&["chown", "-h", owner.as_str(), path.as_ref()])
            .await
    }
}

/// Performs privileged steps in-process (root containers, tests)
pub struct DirectFs {
    runner: Arc<dyn CommandRunner>,
}

impl DirectFs {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PrivilegedFs for DirectFs {
    async fn create_dir_all(&self, path: &Path) -> VolcacheResult<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| VolcacheError::io(format!("creating directory {}", path.display()), e))
    }

    async fn remove_all(&self, path: &Path) -> VolcacheResult<()> {
        let meta = match fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(VolcacheError::io(format!("inspecting {}", path.display()), e))
            }
        };

        let result = if meta.file_type().is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        result.map_err(|e| VolcacheError::io(format!("removing {}", path.display()), e))
    }

    async fn bind_mount(&self, source: &Path, target: &Path) -> VolcacheResult<()> {
        if std::env::consts::OS != "linux" {
            return Err(VolcacheError::BindMountUnsupported(
                std::env::consts::OS.to_string(),
            ));
        }

        let source = source.to_string_lossy();
        let target = target.to_string_lossy();
        let args = ["--bind", source.as_ref(), target.as_ref()];
        let output = self.runner.run("mount", &args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(VolcacheError::privileged(
                command_line("mount", &args),
                output.stderr.trim(),
            ))
        }
    }

    async fn replace_with_symlink(&self, source: &Path, target: &Path) -> VolcacheResult<()> {
        if is_real_dir(target).await {
            self.remove_all(target).await?;
        }

        let tmp = swap_path(target);
        fs::symlink(source, &tmp)
            .await
            .map_err(|e| VolcacheError::io(format!("creating symlink {}", tmp.display()), e))?;

        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(VolcacheError::io(
                format!("replacing {} with a symlink", target.display()),
                e,
            ));
        }
        Ok(())
    }

    async fn chown_to_invoker(&self, path: &Path) -> VolcacheResult<()> {
        let (uid, gid) = invoking_user();
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
            .map_err(|e| VolcacheError::io(format!("changing owner of {}", path.display()), e))
    }
}
