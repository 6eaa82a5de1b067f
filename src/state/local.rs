//! Local file-based state storage backend.
//!
//! State and lock files live in a directory next to the deployment file,
//! one pair per project and environment.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{EdgesiteError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::{StateStore, check_version};
use super::types::DeploymentState;

/// Default state directory name.
pub const STATE_DIR: &str = ".edgesite";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store for `project`/`environment` under `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, project: &str, environment: &str) -> Self {
        let base_dir = base_dir.into();
        let stem = format!("{project}-{environment}");
        let state_path = base_dir.join(format!("{stem}.state.json"));
        let lock_path = base_dir.join(format!("{stem}.state.lock"));

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::write(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            EdgesiteError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
            EdgesiteError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;

        Ok(Some(lock_info))
    }

    /// Writes a file through a temporary sibling and an atomic rename.
    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create {}: {e}", temp_path.display())))?;

        file.write_all(content)
            .await
            .map_err(|e| StateError::write(format!("Failed to write {}: {e}", temp_path.display())))?;

        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync {}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename {}: {e}", temp_path.display())))?;

        Ok(())
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| {
                EdgesiteError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<DeploymentState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            EdgesiteError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        let state: DeploymentState = serde_json::from_str(&content).map_err(|e| {
            EdgesiteError::State(StateError::Corrupted {
                message: format!("Failed to parse state file: {e}"),
            })
        })?;

        check_version(&state)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        info!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        self.write_atomic(&self.state_path, content.as_bytes()).await?;

        debug!("State saved successfully");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| StateError::write(format!("Failed to delete state file: {e}")))?;
        }

        self.delete_lock_file().await?;

        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(EdgesiteError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        self.write_atomic(&self.lock_path, content.as_bytes())
            .await
            .map_err(|e| {
                EdgesiteError::State(StateError::LockFailed {
                    message: e.to_string(),
                })
            })?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn is_locked(&self) -> Result<bool> {
        if let Some(lock_info) = self.read_lock_file().await? {
            return Ok(!lock_info.is_expired());
        }
        Ok(false)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Address;
    use crate::state::types::{ResourceState, STATE_VERSION};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp_dir.path().join(STATE_DIR), "shop", "dev");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = DeploymentState::new("shop", "dev");
        state.set_resource(ResourceState::new(
            Address::managed("aws_s3_bucket", "bucket"),
            "h",
            BTreeSet::new(),
        ));
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.project, "shop");
        assert_eq!(loaded.environment, "dev");
        assert_eq!(loaded.resources, state.resources);
        assert!(store.state_path().ends_with(".edgesite/shop-dev.state.json"));
        assert!(!PathBuf::from(format!("{}.tmp", store.state_path().display())).exists());
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_version() {
        let (store, _temp) = create_test_store();

        let mut state = DeploymentState::new("shop", "dev");
        state.version = String::from("0.1");
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains(STATE_VERSION), "got: {err}");
    }

    #[tokio::test]
    async fn test_load_corrupted() {
        let (store, _temp) = create_test_store();
        std::fs::create_dir_all(store.state_path().parent().unwrap()).unwrap();
        std::fs::write(store.state_path(), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("corrupted"), "got: {err}");
    }

    #[tokio::test]
    async fn test_lock_conflict_and_release() {
        let (store, _temp) = create_test_store();

        let lock = store.acquire_lock("holder-1").await.unwrap();
        let err = store.acquire_lock("holder-2").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("holder-1"));

        // A stale id does not release someone else's lock
        store.release_lock("not-the-id").await.unwrap();
        assert!(store.is_locked().await.unwrap());

        store.release_lock(&lock.lock_id).await.unwrap();
        assert!(!store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_state_and_lock() {
        let (store, _temp) = create_test_store();
        store.save(&DeploymentState::new("shop", "dev")).await.unwrap();
        store.acquire_lock("holder").await.unwrap();

        store.delete().await.unwrap();
        assert!(!store.exists().await.unwrap());
        assert!(!store.is_locked().await.unwrap());
    }
}
