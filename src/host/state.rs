//! Run state handed from the attach phase to the validate phase
//!
//! The two phases run in separate processes. The attach phase saves the
//! exact list of attached requests under [`ATTACHED_PATHS_KEY`]; the validate
//! phase takes it back once.

use crate::cache::attach::Strategy;
use crate::cache::request::CachePathRequest;
use crate::error::{VolcacheError, VolcacheResult};
use crate::host::github;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Key under which the attached request list is stored
pub const ATTACHED_PATHS_KEY: &str = "attached-paths";

/// Key under which the attach strategy is stored
pub const STRATEGY_KEY: &str = "attach-strategy";

/// Per-job key/value store that survives the process boundary
#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// Persist a value under `key`
    async fn save(&self, key: &str, value: &str) -> VolcacheResult<()>;

    /// Read the value under `key` and forget it
    async fn take(&self, key: &str) -> VolcacheResult<Option<String>>;
}

/// Persist the attached request list
pub async fn save_attached(
    store: &dyn RunStateStore,
    requests: &[CachePathRequest],
) -> VolcacheResult<()> {
    let value = serde_json::to_string(requests)?;
    store.save(ATTACHED_PATHS_KEY, &value).await
}

/// Take the attached request list, if the attach phase saved one
pub async fn take_attached(
    store: &dyn RunStateStore,
) -> VolcacheResult<Option<Vec<CachePathRequest>>> {
    match store.take(ATTACHED_PATHS_KEY).await? {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

/// Persist the strategy the attach phase used
pub async fn save_strategy(store: &dyn RunStateStore, strategy: Strategy) -> VolcacheResult<()> {
    store.save(STRATEGY_KEY, &serde_json::to_string(&strategy)?).await
}

/// Take the strategy the attach phase used
pub async fn take_strategy(store: &dyn RunStateStore) -> VolcacheResult<Option<Strategy>> {
    match store.take(STRATEGY_KEY).await? {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

/// Identifier of the current CI job
pub fn job_id() -> String {
    ["GITHUB_RUN_ID", "CI_JOB_ID"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "local".to_string())
}

/// State through the GitHub Actions `GITHUB_STATE` file command.
///
/// The runner hands saved state to the post step as `STATE_<key>`.
pub struct GithubStateStore {
    state_file: PathBuf,
}

impl GithubStateStore {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    fn env_key(key: &str) -> String {
        format!("STATE_{}", key)
    }
}

#[async_trait]
impl RunStateStore for GithubStateStore {
    async fn save(&self, key: &str, value: &str) -> VolcacheResult<()> {
        github::append_command(&self.state_file, key, value)
            .await
            .map_err(|e| VolcacheError::StatePersist(e.to_string()))
    }

    async fn take(&self, key: &str) -> VolcacheResult<Option<String>> {
        let env_key = Self::env_key(key);
        let value = std::env::var(&env_key).ok().filter(|v| !v.is_empty());
        if value.is_some() {
            std::env::remove_var(&env_key);
        }
        Ok(value)
    }
}

/// State in a JSON file under a local directory, keyed by job
pub struct FileStateStore {
    path: PathBuf,
    job: String,
}

type JobState = BTreeMap<String, BTreeMap<String, String>>;

impl FileStateStore {
    pub fn new(state_dir: &Path, job: impl Into<String>) -> Self {
        Self {
            path: state_dir.join("run-state.json"),
            job: job.into(),
        }
    }

    /// Store for the current job
    pub fn for_current_job(state_dir: &Path) -> Self {
        Self::new(state_dir, job_id())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> VolcacheResult<JobState> {
        if !self.path.exists() {
            return Ok(JobState::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| VolcacheError::io(format!("reading run state {}", self.path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write(&self, state: &JobState) -> VolcacheResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VolcacheError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| VolcacheError::io(format!("writing run state {}", self.path.display()), e))
    }
}

#[async_trait]
impl RunStateStore for FileStateStore {
    async fn save(&self, key: &str, value: &str) -> VolcacheResult<()> {
        let mut state = self.read().await?;
        state
            .entry(self.job.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.write(&state)
            .await
            .map_err(|e| VolcacheError::StatePersist(e.to_string()))?;
        debug!("Saved {} for job {} to {}", key, self.job, self.path.display());
        Ok(())
    }

    async fn take(&self, key: &str) -> VolcacheResult<Option<String>> {
        let mut state = self.read().await?;
        let Some(entries) = state.get_mut(&self.job) else {
            return Ok(None);
        };

        let value = entries.remove(key);
        if entries.is_empty() {
            state.remove(&self.job);
        }
        if value.is_some() {
            self.write(&state).await?;
        }
        Ok(value)
    }
}

/// In-memory state for tests and embedding
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStateStore for MemoryStateStore {
    async fn save(&self, key: &str, value: &str) -> VolcacheResult<()> {
        self.entries
            .lock()
            .map_err(|_| VolcacheError::StatePersist("state lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn take(&self, key: &str) -> VolcacheResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| VolcacheError::StatePersist("state lock poisoned".to_string()))?
            .remove(key))
    }
}
