//! Persisted deployment state
//!
//! Only `{bucket, externalBucket, region, stackName}` survives between
//! invocations. The reconciler writes it after a deploy or remove has fully
//! completed, so a crash between a remote mutation and the save leaves the
//! local copy stale until the next deploy's diff step catches up.
//!
//! The file-backed store keeps `.stackflow/state.json`; an empty mapping
//! (`{}`) means nothing is deployed.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_DIR: &str = ".stackflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// State carried across invocations for one stack identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub bucket: String,
    pub external_bucket: bool,
    pub region: String,
    pub stack_name: String,
}

/// Load/save of [`PersistedState`]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when nothing is deployed
    async fn load(&self) -> Result<Option<PersistedState>>;

    async fn save(&self, state: &PersistedState) -> Result<()>;

    /// Reset to the empty state
    async fn clear(&self) -> Result<()>;
}

/// State manager for reading/writing the state file
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Replace the state file, keeping the previous one as a backup
    async fn write(&self, content: String) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");

        // state.json stays in place until the rename below replaces it
        fs::write(&tmp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
            tracing::debug!("Created state backup");
        }

        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Acquire a lock for exclusive access to this project's state
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[async_trait]
impl StateStore for StateManager {
    async fn load(&self) -> Result<Option<PersistedState>> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        match value {
            serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
            serde_json::Value::Object(_) => {
                let state: PersistedState = serde_json::from_value(value).map_err(|e| {
                    CloudError::StateError(format!("{}: {}", path.display(), e))
                })?;
                tracing::debug!("Loaded state for stack {}", state.stack_name);
                Ok(Some(state))
            }
            _ => Err(CloudError::StateError(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        self.write(serde_json::to_string_pretty(state)?).await?;
        tracing::debug!("Saved state for stack {}", state.stack_name);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.write("{}".to_string()).await?;
        tracing::debug!("Cleared state");
        Ok(())
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> PersistedState {
        PersistedState {
            bucket: "stackflow-api-1a2b3c".to_string(),
            external_bucket: false,
            region: "us-east-1".to_string(),
            stack_name: "api".to_string(),
        }
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&sample()).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded, Some(sample()));
    }

    #[tokio::test]
    async fn test_state_file_shape() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.save(&sample()).await.unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join(".stackflow/state.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["bucket", "externalBucket", "region", "stackName"]);
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        assert!(manager.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_writes_empty_mapping() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.save(&sample()).await.unwrap();

        manager.clear().await.unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join(".stackflow/state.json")).unwrap();
        assert_eq!(raw, "{}");
        assert!(manager.load().await.unwrap().is_none());
        assert!(temp_dir.path().join(".stackflow/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.save(&sample()).await.unwrap();

        // A directory in the way makes the temporary write fail
        std::fs::create_dir(temp_dir.path().join(".stackflow/state.json.tmp")).unwrap();
        let next = PersistedState {
            bucket: "other".to_string(),
            ..sample()
        };
        assert!(manager.save(&next).await.is_err());

        assert_eq!(manager.load().await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn test_save_keeps_backup_of_previous_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager.save(&sample()).await.unwrap();

        let next = PersistedState {
            region: "eu-west-1".to_string(),
            ..sample()
        };
        manager.save(&next).await.unwrap();

        let backup =
            std::fs::read_to_string(temp_dir.path().join(".stackflow/state.json.backup")).unwrap();
        let backup: PersistedState = serde_json::from_str(&backup).unwrap();
        assert_eq!(backup, sample());
        assert_eq!(manager.load().await.unwrap(), Some(next));
        assert!(!temp_dir.path().join(".stackflow/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join(".stackflow/lock.json").exists());
    }
}
