//! State management module.
//!
//! Persistent state records which declarations were applied and with which
//! hash, the last engine outputs, and a bounded operation history.

mod local;
mod lock;
mod s3;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, StateLock, generate_holder_id};
pub use s3::{ENGINE_STATE_FILE, S3StateStore, engine_state_key};
pub use store::StateStore;
pub use types::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, ResourceState, STATE_VERSION,
};
