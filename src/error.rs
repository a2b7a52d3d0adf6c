//! Error types for volcache
//!
//! All modules use `VolcacheResult<T>` as their return type. Only fatal
//! conditions are represented here; per-mode failures, advisories and
//! validation findings are logged and reported, never returned as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for volcache operations
pub type VolcacheResult<T> = Result<T, VolcacheError>;

/// All errors that can occur in volcache
#[derive(Error, Debug)]
pub enum VolcacheError {
    // Environment errors
    #[error("volcache requires a cache volume to be configured (set VOLCACHE_ROOT)")]
    CacheVolumeMissing,

    #[error("Cache volume root {0} does not exist")]
    CacheVolumeNotFound(PathBuf),

    #[error("Could not determine the home directory of the invoking user")]
    HomeDirUnknown,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Resolution errors (only fatal to the mode that raised them)
    #[error("Unknown cache mode: {0}")]
    UnknownMode(String),

    #[error("Introspection command '{command}' failed: {reason}")]
    Introspection { command: String, reason: String },

    // Attachment errors
    #[error("Invalid mount target {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    #[error("Privileged command failed: {command}, stderr: {stderr}")]
    Privileged { command: String, stderr: String },

    #[error("Bind mounts are not supported on {0}")]
    BindMountUnsupported(String),

    #[error("Cache miss for: {0}")]
    CacheMiss(String),

    // State errors
    #[error("Failed to persist run state: {0}")]
    StatePersist(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VolcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an introspection error
    pub fn introspection(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Introspection {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a privileged command error
    pub fn privileged(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Privileged {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the error only invalidates a single mode's resolution
    pub fn is_mode_local(&self) -> bool {
        matches!(
            self,
            Self::UnknownMode(_)
                | Self::Introspection { .. }
                | Self::PathInvalid { .. }
                | Self::CommandFailed { .. }
                | Self::Json(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CacheVolumeMissing | Self::CacheVolumeNotFound(_) => Some(
                "Provision a cache volume for this runner (for example a runner label that \
                 requests a cache volume) and export its mount point as VOLCACHE_ROOT. \
                 If the job runs inside a container, mount the cache volume into it as well.",
            ),
            Self::HomeDirUnknown => Some("Set HOME for the user running the job"),
            Self::Privileged { .. } => {
                Some("Privileged steps use sudo; make sure passwordless sudo is available")
            }
            Self::BindMountUnsupported(_) => Some("Use --strategy symlink on this platform"),
            Self::ConfigInvalid { .. } => Some("Fix or remove the volcache config file"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VolcacheError::CacheVolumeMissing;
        assert!(err.to_string().contains("requires a cache volume"));
    }

    #[test]
    fn error_hint() {
        let err = VolcacheError::CacheVolumeMissing;
        assert!(err.hint().unwrap().contains("VOLCACHE_ROOT"));
        assert!(VolcacheError::CacheMiss("/a".into()).hint().is_none());
    }

    #[test]
    fn mode_local_errors() {
        assert!(VolcacheError::UnknownMode("foobar".into()).is_mode_local());
        assert!(VolcacheError::introspection("go env", "exit 1").is_mode_local());
        assert!(VolcacheError::PathInvalid {
            path: "relative/dir".into(),
            reason: "not absolute".into(),
        }
        .is_mode_local());
        assert!(!VolcacheError::CacheVolumeMissing.is_mode_local());
        assert!(!VolcacheError::HomeDirUnknown.is_mode_local());
        assert!(!VolcacheError::privileged("mount", "denied").is_mode_local());
    }
}
