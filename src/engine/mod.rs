//! Hand-off to the external provisioning engine.
//!
//! The engine consumes the rendered descriptor from its working directory
//! and performs dependency resolution, diffing against its own state and
//! ordered create, update and delete against the provider APIs.

mod terraform;

pub use terraform::{DESCRIPTOR_FILE, TerraformEngine};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;

/// Output values reported by the engine, by name.
pub type EngineOutputs = BTreeMap<String, String>;

/// Operations the deployment tool needs from a provisioning engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplyEngine: Send + Sync {
    /// Prepares the working directory (providers, backends).
    async fn init(&self) -> Result<()>;

    /// Converges real infrastructure to the rendered descriptor.
    async fn apply(&self) -> Result<()>;

    /// Destroys everything the engine manages in the working directory.
    async fn destroy(&self) -> Result<()>;

    /// Reads output values after an apply.
    async fn outputs(&self) -> Result<EngineOutputs>;

    /// Returns true when real infrastructure differs from the descriptor.
    async fn has_drift(&self) -> Result<bool>;

    /// Short engine name for messages.
    fn name(&self) -> &'static str;
}
