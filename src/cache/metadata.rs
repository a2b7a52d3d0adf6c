//! Ledger of what is cached where inside the volume
//!
//! Stored as one JSON document at the volume root. The ledger is diagnostic
//! only: a missing or malformed file reads as empty, and failing to write it
//! is logged and otherwise ignored.

use crate::cache::request::CachePathRequest;
use crate::error::{VolcacheError, VolcacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// File name of the ledger at the volume root
pub const METADATA_FILE: &str = ".volcache-metadata.json";

/// Ledger schema version
pub const METADATA_VERSION: u32 = 1;

/// One cache-side directory in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Mode tag of the most recent request for this directory
    pub cache_framework: String,

    /// Every mount target that was ever backed by this directory
    #[serde(default)]
    pub mount_target: Vec<String>,

    /// Tool version that last wrote the entry
    #[serde(default)]
    pub source: String,
}

/// The ledger document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    #[serde(default)]
    pub version: u32,

    pub updated_at: Option<DateTime<Utc>>,

    /// Entries keyed by cache-side path
    #[serde(default)]
    pub user_request: BTreeMap<String, CacheEntry>,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            updated_at: None,
            user_request: BTreeMap::new(),
        }
    }
}

impl CacheMetadata {
    /// Merge attached requests into the ledger.
    ///
    /// The framework is overwritten; mount targets only accumulate.
    pub fn merge(&mut self, requests: &[CachePathRequest]) {
        self.version = METADATA_VERSION;
        self.updated_at = Some(Utc::now());

        for request in requests {
            let key = request.cache_path.to_string_lossy().into_owned();
            let entry = self.user_request.entry(key).or_insert_with(|| CacheEntry {
                cache_framework: request.framework.clone(),
                mount_target: Vec::new(),
                source: String::new(),
            });

            entry.cache_framework = request.framework.clone();
            entry.source = source_tag();
            if !entry.mount_target.contains(&request.mount_target) {
                entry.mount_target.push(request.mount_target.clone());
            }
        }
    }
}

fn source_tag() -> String {
    format!("volcache/{}", env!("CARGO_PKG_VERSION"))
}

/// Reads and writes the ledger for one volume
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Store for the ledger at the given volume root
    pub fn new(volume_root: &Path) -> Self {
        Self {
            path: volume_root.join(METADATA_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, treating absent or malformed content as empty
    pub async fn load(&self) -> CacheMetadata {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read cache metadata {}: {}", self.path.display(), e);
                }
                return CacheMetadata::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring malformed cache metadata {}: {}", self.path.display(), e);
                CacheMetadata::default()
            }
        }
    }

    /// Merge requests into the ledger and write it back.
    ///
    /// Never fails the run; errors are logged.
    pub async fn record(&self, requests: &[CachePathRequest]) {
        let mut metadata = self.load().await;
        metadata.merge(requests);

        match self.write(&metadata).await {
            Ok(()) => debug!("Updated cache metadata at {}", self.path.display()),
            Err(e) => warn!("Failed to update cache metadata: {}", e),
        }
    }

    async fn write(&self, metadata: &CacheMetadata) -> VolcacheResult<()> {
        let content = serde_json::to_string_pretty(metadata)?;
        fs::write(&self.path, content).await.map_err(|e| {
            VolcacheError::io(format!("writing cache metadata {}", self.path.display()), e)
        })
    }
}
