//! S3-based state storage backend.
//!
//! Shared state for teams deploying the same site from several machines.
//! Objects are laid out as `<prefix><project>/<environment>/state.json` with
//! the lock object next to it.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{EdgesiteError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::{StateStore, check_version};
use super::types::DeploymentState;

/// State object name.
const STATE_KEY: &str = "state.json";

/// Lock object name.
const LOCK_KEY: &str = "state.lock";

/// S3-based state store.
#[derive(Debug)]
pub struct S3StateStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix including project and environment, ending in `/`.
    prefix: String,
}

impl S3StateStore {
    /// Creates a new S3 state store using the default credential chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(
        bucket: &str,
        prefix: Option<&str>,
        region: Option<&str>,
        project: &str,
        environment: &str,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;

        Ok(Self::with_client(
            Client::new(&config),
            bucket,
            prefix,
            project,
            environment,
        ))
    }

    /// Creates a new S3 state store with an existing client.
    #[must_use]
    pub fn with_client(
        client: Client,
        bucket: &str,
        prefix: Option<&str>,
        project: &str,
        environment: &str,
    ) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: key_prefix(prefix, project, environment),
        }
    }

    /// Gets the full S3 key for a file.
    fn key(&self, file: &str) -> String {
        format!("{}{file}", self.prefix)
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| StateError::s3(format!("Failed to read S3 object: {e}")))?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    EdgesiteError::State(StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    })
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StateError::s3(format!("S3 get error: {service_err}")).into())
                }
            }
        }
    }

    /// Puts an object to S3.
    async fn put_object(&self, key: &str, content: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StateError::s3(format!("S3 put error: {e}")))?;

        Ok(())
    }

    /// Deletes an object from S3.
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StateError::s3(format!("S3 delete error: {e}")))?;

        Ok(())
    }

    /// Checks if an object exists in S3.
    async fn object_exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StateError::s3(format!("S3 head error: {service_err}")).into())
                }
            }
        }
    }
}

/// File name of the engine's own state next to the deployment state.
pub const ENGINE_STATE_FILE: &str = "terraform.tfstate";

/// Key of the engine's state object: `<prefix>/<project>/<environment>/terraform.tfstate`.
///
/// Shares the layout of [`S3StateStore`] so both states of a stack live
/// side by side.
#[must_use]
pub fn engine_state_key(prefix: Option<&str>, project: &str, environment: &str) -> String {
    format!("{}{ENGINE_STATE_FILE}", key_prefix(prefix, project, environment))
}

/// Builds `<prefix>/<project>/<environment>/`, skipping an empty prefix.
fn key_prefix(prefix: Option<&str>, project: &str, environment: &str) -> String {
    let base = prefix.map(|p| p.trim_matches('/')).unwrap_or_default();
    if base.is_empty() {
        format!("{project}/{environment}/")
    } else {
        format!("{base}/{project}/{environment}/")
    }
}

fn parse_lock(content: &str) -> Result<LockInfo> {
    serde_json::from_str(content).map_err(|e| {
        EdgesiteError::State(StateError::Corrupted {
            message: format!("Failed to parse lock: {e}"),
        })
    })
}

#[async_trait]
impl StateStore for S3StateStore {
    async fn load(&self) -> Result<Option<DeploymentState>> {
        let key = self.key(STATE_KEY);
        debug!("Loading state from s3://{}/{key}", self.bucket);

        let Some(json) = self.get_object(&key).await? else {
            debug!("No state found in S3");
            return Ok(None);
        };

        let state: DeploymentState = serde_json::from_str(&json).map_err(|e| {
            EdgesiteError::State(StateError::Corrupted {
                message: format!("Failed to parse state: {e}"),
            })
        })?;
        check_version(&state)?;

        info!(
            "Loaded state for project: {}/{}",
            state.project, state.environment
        );
        Ok(Some(state))
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        let key = self.key(STATE_KEY);
        info!("Saving state to s3://{}/{key}", self.bucket);

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        self.put_object(&key, &content).await?;

        debug!("State saved successfully to S3");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let state_key = self.key(STATE_KEY);
        let lock_key = self.key(LOCK_KEY);

        info!("Deleting state from s3://{}/{state_key}", self.bucket);

        self.delete_object(&state_key).await?;
        self.delete_object(&lock_key).await?;

        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        let key = self.key(STATE_KEY);
        self.object_exists(&key).await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let key = self.key(LOCK_KEY);

        if let Some(content) = self.get_object(&key).await? {
            let existing = parse_lock(&content)?;
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

        self.put_object(&key, &content).await?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        let key = self.key(LOCK_KEY);

        if let Some(content) = self.get_object(&key).await? {
            let existing = parse_lock(&content)?;

            if existing.lock_id == lock_id {
                self.delete_object(&key).await?;
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
        let key = self.key(LOCK_KEY);
        self.get_object(&key)
            .await?
            .map(|content| parse_lock(&content))
            .transpose()
    }

    async fn is_locked(&self) -> Result<bool> {
        if let Some(lock_info) = self.get_lock_info().await? {
            return Ok(!lock_info.is_expired());
        }
        Ok(false)
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix_layout() {
        assert_eq!(key_prefix(None, "shop", "prod"), "shop/prod/");
        assert_eq!(key_prefix(Some(""), "shop", "prod"), "shop/prod/");
        assert_eq!(key_prefix(Some("/edgesite/"), "shop", "prod"), "edgesite/shop/prod/");
        assert_eq!(key_prefix(Some("a/b"), "shop", "dev"), "a/b/shop/dev/");
        assert_eq!(
            engine_state_key(Some("edgesite"), "shop", "prod"),
            "edgesite/shop/prod/terraform.tfstate"
        );
    }

    #[test]
    fn test_parse_lock() {
        let info = LockInfo::new("ci-runner");
        let parsed = parse_lock(&serde_json::to_string(&info).unwrap()).unwrap();
        assert_eq!(parsed, info);
        assert!(parse_lock("nope").is_err());
    }
}
