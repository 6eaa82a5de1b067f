//! State locking for concurrent access protection.
//!
//! Locks expire on their own so a crashed apply never wedges the state; the
//! backends treat an expired lock as absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

use super::store::StateStore;

/// Lock expiry duration in seconds.
///
/// Certificate issuance and distribution creation can each take many
/// minutes, so the window is wider than a typical API round trip.
pub const LOCK_EXPIRY_SECS: i64 = 3600;

/// Information about a state lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lock info.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

/// A held lock on a state store.
///
/// Must be released explicitly; an unreleased lock lapses after
/// [`LOCK_EXPIRY_SECS`].
#[derive(Debug)]
pub struct StateLock<'a, S: StateStore + ?Sized> {
    store: &'a S,
    info: LockInfo,
}

impl<'a, S: StateStore + ?Sized> StateLock<'a, S> {
    /// Acquires the lock on `store` for `holder`.
    ///
    /// # Errors
    ///
    /// Returns an error if another holder owns an unexpired lock.
    pub async fn acquire(store: &'a S, holder: &str) -> Result<Self> {
        let info = store.acquire_lock(holder).await?;
        debug!("Acquired state lock {} for {}", info.lock_id, info.holder);
        Ok(Self { store, info })
    }

    /// Gets the lock info.
    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot remove the lock.
    pub async fn release(self) -> Result<()> {
        if let Err(e) = self.store.release_lock(&self.info.lock_id).await {
            warn!("Failed to release state lock {}: {e}", self.info.lock_id);
            return Err(e);
        }
        debug!("Released state lock {}", self.info.lock_id);
        Ok(())
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LocalStateStore;
    use tempfile::TempDir;

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("test-holder");
        assert_eq!(info.holder, "test-holder");
        assert!(!info.is_expired());
        assert!(info.remaining_secs() > 0);
    }

    #[test]
    fn test_expired_lock() {
        let mut info = LockInfo::new("test-holder");
        info.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(info.is_expired());
        assert_eq!(info.remaining_secs(), 0);
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::new(temp.path(), "shop", "prod");

        let lock = StateLock::acquire(&store, "holder-1").await.unwrap();
        assert_eq!(lock.info().holder, "holder-1");
        assert!(store.is_locked().await.unwrap());
        assert!(StateLock::acquire(&store, "holder-2").await.is_err());

        lock.release().await.unwrap();
        assert!(!store.is_locked().await.unwrap());
    }
}
