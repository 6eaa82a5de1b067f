//! Diff engine for comparing the desired descriptor with recorded state.
//!
//! Each managed declaration is hashed; a hash that differs from the one
//! recorded at the last successful apply means the declaration changed.
//! Data sources are read-only lookups and never produce a diff.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::ConfigHasher;
use crate::descriptor::{Address, Descriptor, Resource};
use crate::state::DeploymentState;

/// Engine for computing diffs between desired and recorded states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Resource hasher.
    hasher: ConfigHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Resource address.
    pub address: Address,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Recorded hash (if any).
    pub old_hash: Option<String>,
    /// Desired hash (if still declared).
    pub new_hash: Option<String>,
    /// Dependencies of the declaration, desired or recorded.
    pub dependencies: BTreeSet<Address>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Resource needs to be updated.
    Update,
    /// Resource needs to be deleted.
    Delete,
    /// Resource is unchanged.
    NoChange,
}

/// Complete diff result.
#[derive(Debug)]
pub struct DiffResult {
    /// All resource diffs: declared resources by address, then removals.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update.
    pub updates: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Desired hash of every managed declaration, by address.
    #[must_use]
    pub fn desired_hashes(&self, descriptor: &Descriptor) -> BTreeMap<Address, String> {
        descriptor
            .managed_resources()
            .map(|r| (r.address().clone(), self.hash(descriptor, r)))
            .collect()
    }

    fn hash(&self, descriptor: &Descriptor, resource: &Resource) -> String {
        self.hasher
            .hash_resource(resource, descriptor.provider_for(resource))
    }

    /// Computes the diff between the descriptor and the recorded state.
    #[must_use]
    pub fn compute_diff(&self, descriptor: &Descriptor, state: Option<&DeploymentState>) -> DiffResult {
        let mut diffs = Vec::new();

        for resource in descriptor.managed_resources() {
            let address = resource.address();
            let new_hash = self.hash(descriptor, resource);
            let recorded = state.and_then(|s| s.get_resource(&address.to_string()));

            let diff_type = match recorded {
                None => DiffType::Create,
                Some(r) if ConfigHasher::hashes_match(&r.hash, &new_hash) => DiffType::NoChange,
                Some(_) => DiffType::Update,
            };

            if diff_type != DiffType::NoChange {
                debug!("{address} needs {diff_type}");
            }

            diffs.push(ResourceDiff {
                address: address.clone(),
                diff_type,
                old_hash: recorded.map(|r| r.hash.clone()),
                new_hash: Some(new_hash),
                dependencies: resource.dependencies(),
            });
        }

        if let Some(state) = state {
            for recorded in state.resources.values() {
                if descriptor.get(&recorded.address).is_none() {
                    debug!("{} is no longer declared", recorded.address);
                    diffs.push(ResourceDiff {
                        address: recorded.address.clone(),
                        diff_type: DiffType::Delete,
                        old_hash: Some(recorded.hash.clone()),
                        new_hash: None,
                        dependencies: recorded.dependencies.clone(),
                    });
                }
            }
        }

        let count = |kind: DiffType| diffs.iter().filter(|d| d.diff_type == kind).count();
        let creates = count(DiffType::Create);
        let updates = count(DiffType::Update);
        let deletes = count(DiffType::Delete);
        let unchanged = count(DiffType::NoChange);

        DiffResult {
            diffs,
            creates,
            updates,
            deletes,
            unchanged,
        }
    }
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.deletes > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address, self.diff_type)
    }
}
