//! volcache - persistent cache volumes for ephemeral CI jobs
//!
//! Resolves which host paths are build-tool caches, attaches each one from
//! a persistent cache volume at job start, and re-checks the attachments
//! once the job's build steps have run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;

pub use error::{VolcacheError, VolcacheResult};
