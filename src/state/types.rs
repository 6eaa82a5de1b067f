//! State types for tracking deployments.
//!
//! The state records what the last successful apply declared, resource by
//! resource, so the next plan can tell what changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::Address;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete deployment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Hash of the last applied configuration.
    pub config_hash: String,
    /// Applied resources by address.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
    /// Output values reported by the engine after the last apply.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Deployment history (recent entries).
    #[serde(default)]
    pub history: Vec<DeploymentHistoryEntry>,
}

/// A resource as last applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceState {
    /// Resource address.
    pub address: Address,
    /// Hash of the declaration when applied.
    pub hash: String,
    /// Declarations this one depended on, used to order its removal.
    #[serde(default)]
    pub dependencies: BTreeSet<Address>,
    /// When the declaration was last applied.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the deployment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: DeploymentOperation,
    /// Configuration hash at the time.
    pub config_hash: String,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of deployment operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOperation {
    /// Create or update resources.
    Apply,
    /// Tear everything down.
    Destroy,
}

impl DeploymentState {
    /// Creates a new empty deployment state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            config_hash: String::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource by address.
    #[must_use]
    pub fn get_resource(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// Adds or updates a resource.
    pub fn set_resource(&mut self, resource: ResourceState) {
        self.resources.insert(resource.address.to_string(), resource);
        self.last_updated = Utc::now();
    }

    /// Removes a resource by address.
    pub fn remove_resource(&mut self, address: &str) -> Option<ResourceState> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Replaces the recorded outputs.
    pub fn set_outputs(&mut self, outputs: BTreeMap<String, String>) {
        self.outputs = outputs;
        self.last_updated = Utc::now();
    }

    /// Forgets every resource and output.
    pub fn clear(&mut self) {
        self.resources.clear();
        self.outputs.clear();
        self.config_hash.clear();
        self.last_updated = Utc::now();
    }

    /// Adds a history entry, dropping the oldest beyond the limit.
    pub fn add_history(&mut self, entry: DeploymentHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all recorded addresses, sorted.
    #[must_use]
    pub fn resource_addresses(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Returns the most recent history entry.
    #[must_use]
    pub fn last_operation(&self) -> Option<&DeploymentHistoryEntry> {
        self.history.last()
    }
}

impl ResourceState {
    /// Creates a resource record stamped now.
    #[must_use]
    pub fn new(address: Address, hash: &str, dependencies: BTreeSet<Address>) -> Self {
        Self {
            address,
            hash: hash.to_string(),
            dependencies,
            updated_at: Utc::now(),
        }
    }
}

impl DeploymentHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: DeploymentOperation, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: DeploymentOperation,
        config_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for DeploymentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
