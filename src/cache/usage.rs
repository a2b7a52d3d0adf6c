//! Disk usage of the cache volume

use crate::cache::sys;
use crate::error::{VolcacheError, VolcacheResult};
use std::path::Path;

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Total and used space of the filesystem holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
}

impl DiskUsage {
    /// Query the filesystem with `statvfs`
    pub fn of(path: &Path) -> VolcacheResult<Self> {
        let stats = sys::statvfs(path).map_err(|e| {
            VolcacheError::io(format!("reading disk usage of {}", path.display()), e)
        })?;

        let total = stats.blocks * stats.fragment_size;
        let free = stats.blocks_free * stats.fragment_size;
        Ok(Self {
            total,
            used: total.saturating_sub(free),
        })
    }
}

impl std::fmt::Display for DiskUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} used of {}",
            format_bytes(self.used),
            format_bytes(self.total)
        )
    }
}
