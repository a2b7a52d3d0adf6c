//! Post-run re-examination of attached cache paths
//!
//! Runs after the job's own build steps. Nothing found here fails the job:
//! every discrepancy is a warning.

use crate::cache::attach::Strategy;
use crate::cache::mapper::expand_home;
use crate::cache::privileged::PrivilegedFs;
use crate::cache::request::CachePathRequest;
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

/// Trailing pointer printed once when any problem was found
pub const TROUBLESHOOTING: &str =
    "Steps that recreate a cached path (such as a repository checkout) must run before `volcache attach`; see the Troubleshooting section of the volcache README";

/// What went wrong with one attached path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    /// The mount target no longer exists
    TargetMissing,
    /// The mount target exists but is no longer a symlink
    NotSymlink,
    /// A workspace-scoped cache directory could not be cleared
    WipeFailed,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Problem::TargetMissing => {
                "was linked to the cache volume, but does not exist any more. Did another step (e.g. checkout) delete it?"
            }
            Problem::NotSymlink => {
                "was linked to the cache volume, but is not a symlink anymore. Did another step (e.g. checkout) overwrite it?"
            }
            Problem::WipeFailed => "could not clear its workspace-scoped cache directory",
        };
        f.write_str(text)
    }
}

/// A problem tied to a mount target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub mount_target: String,
    pub problem: Problem,
}

/// Outcome of validating one run's attachments
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Mount targets confirmed as still cached
    pub cached: Vec<String>,
    /// Mount targets whose cache-side contents were cleared
    pub wiped: Vec<String>,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn found_problems(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Re-checks attachments made by the attach phase
pub struct PostValidator {
    strategy: Strategy,
    fs: Box<dyn PrivilegedFs>,
    home_dir: PathBuf,
}

impl PostValidator {
    /// `home_dir` expands `~` in mount targets
    pub fn new(strategy: Strategy, fs: Box<dyn PrivilegedFs>, home_dir: PathBuf) -> Self {
        Self {
            strategy,
            fs,
            home_dir,
        }
    }

    /// Validate every request in order
    pub async fn validate(&self, requests: &[CachePathRequest]) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.strategy == Strategy::BindMount {
            debug!("Using bind mounts: shadowing cannot be detected without elevation");
        }

        for request in requests {
            match self.strategy {
                Strategy::Symlink => self.check_symlink(request, &mut report).await,
                Strategy::BindMount => {
                    info!("{}: cached", request.mount_target);
                    report.cached.push(request.mount_target.clone());
                }
            }
        }

        if report.found_problems() {
            info!("{}", TROUBLESHOOTING);
        }
        report
    }

    async fn check_symlink(&self, request: &CachePathRequest, report: &mut ValidationReport) {
        if request.wipe {
            match self.fs.remove_all(&request.cache_path).await {
                Ok(()) => {
                    debug!("{}: cleared {}", request.mount_target, request.cache_path.display());
                    report.wiped.push(request.mount_target.clone());
                }
                Err(e) => {
                    warn!("{}: {}: {}", request.mount_target, Problem::WipeFailed, e);
                    report.findings.push(Finding {
                        mount_target: request.mount_target.clone(),
                        problem: Problem::WipeFailed,
                    });
                }
            }
            return;
        }

        let target = expand_home(&request.mount_target, &self.home_dir);
        let problem = match fs::symlink_metadata(&target).await {
            Err(_) => Some(Problem::TargetMissing),
            Ok(meta) if !meta.file_type().is_symlink() => Some(Problem::NotSymlink),
            Ok(_) => None,
        };

        match problem {
            Some(problem) => {
                warn!("{}: {}", request.mount_target, problem);
                report.findings.push(Finding {
                    mount_target: request.mount_target.clone(),
                    problem,
                });
            }
            None => {
                info!("{}: cached", request.mount_target);
                report.cached.push(request.mount_target.clone());
            }
        }
    }
}
