//! Deployment plan types and construction.
//!
//! A plan is the ordered list of changes the engine is expected to make:
//! removals first, dependents before their dependencies, then creations and
//! updates with dependencies first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::{Address, DependencyGraph, Descriptor};
use crate::error::Result;

use super::diff::{DiffResult, DiffType, ResourceDiff};

/// A complete deployment plan.
#[derive(Debug, Serialize)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
    /// Number of declarations left untouched.
    pub unchanged: usize,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource address.
    #[serde(serialize_with = "serialize_address")]
    pub address: Address,
    /// Reason for this action.
    pub reason: String,
    /// Hash the resource will be recorded with (creates and updates).
    pub new_hash: Option<String>,
    /// Other actions in this plan that must complete first.
    #[serde(serialize_with = "serialize_addresses")]
    pub dependencies: BTreeSet<Address>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create a new resource.
    Create,
    /// Update a resource in place.
    Update,
    /// Delete a resource that is no longer declared.
    Delete,
}

impl DeploymentPlan {
    /// Creates a plan from a diff, ordered by the dependency graph.
    ///
    /// # Errors
    ///
    /// Returns an error if either the desired or the removed resources form
    /// an invalid graph.
    pub fn from_diff(diff: &DiffResult, descriptor: &Descriptor, config_hash: &str) -> Result<Self> {
        let by_address: BTreeMap<&Address, &ResourceDiff> =
            diff.actionable_diffs().into_iter().map(|d| (&d.address, d)).collect();

        let mut actions = Vec::with_capacity(by_address.len());

        // Removals: reverse order over the graph of removed resources
        let mut removed = DependencyGraph::new();
        for d in by_address.values().filter(|d| d.diff_type == DiffType::Delete) {
            removed.add_node(&d.address);
            for dep in d.dependencies.iter().filter(|dep| is_removed(&by_address, dep)) {
                removed.add_dependency(&d.address, dep);
            }
        }
        for address in removed.resolve_order()?.into_iter().rev() {
            let dependents = removed.dependents_of(&address);
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                address,
                reason: String::from("No longer declared"),
                new_hash: None,
                dependencies: dependents,
            });
        }

        // Creations and updates: dependencies first
        for address in descriptor.graph()?.resolve_order()? {
            let Some(d) = by_address.get(&address) else {
                continue;
            };
            let action_type = match d.diff_type {
                DiffType::Create => ActionType::Create,
                DiffType::Update => ActionType::Update,
                DiffType::Delete | DiffType::NoChange => continue,
            };
            let reason = match action_type {
                ActionType::Create => String::from("Declared but not yet applied"),
                _ => String::from("Declaration changed"),
            };
            let dependencies = d
                .dependencies
                .iter()
                .filter(|dep| by_address.contains_key(dep))
                .cloned()
                .collect();

            actions.push(PlannedAction {
                action_type,
                address,
                reason,
                new_hash: d.new_hash.clone(),
                dependencies,
            });
        }

        Ok(Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
            unchanged: diff.unchanged,
        })
    }

    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(config_hash: &str) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions: vec![],
            unchanged: 0,
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of one type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Addresses touched by this plan, in order.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.address.to_string()).collect()
    }
}

fn is_removed(by_address: &BTreeMap<&Address, &ResourceDiff>, address: &Address) -> bool {
    by_address
        .get(address)
        .is_some_and(|d| d.diff_type == DiffType::Delete)
}

fn serialize_address<S: serde::Serializer>(address: &Address, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(address)
}

fn serialize_addresses<S: serde::Serializer>(
    addresses: &BTreeSet<Address>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(addresses.iter().map(ToString::to_string))
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {}", self.address),
            ActionType::Update => format!("Update {}", self.address),
            ActionType::Delete => format!("Delete {}", self.address),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Props, Resource};
    use crate::planner::DiffEngine;
    use crate::state::{DeploymentState, ResourceState};

    fn bucket() -> Address {
        Address::managed("aws_s3_bucket", "bucket")
    }

    fn object(name: &str) -> Address {
        Address::managed("aws_s3_object", name)
    }

    fn site(objects: &[&str]) -> Descriptor {
        let mut descriptor = Descriptor::new();
        descriptor
            .add(Resource::new(bucket(), Props::new().set("bucket_prefix", "shop-")))
            .unwrap();
        for name in objects {
            descriptor
                .add(Resource::new(
                    object(name),
                    Props::new().set("bucket", bucket().attr("id")).set("key", *name),
                ))
                .unwrap();
        }
        descriptor
    }

    fn plan(descriptor: &Descriptor, state: Option<&DeploymentState>) -> DeploymentPlan {
        let diff = DiffEngine::new().compute_diff(descriptor, state);
        DeploymentPlan::from_diff(&diff, descriptor, "cfg").unwrap()
    }

    #[test]
    fn test_creates_follow_dependencies() {
        let descriptor = site(&["a", "b"]);
        let plan = plan(&descriptor, None);

        assert_eq!(plan.action_count(), 3);
        assert_eq!(plan.count(ActionType::Create), 3);
        assert_eq!(plan.actions[0].address, bucket());
        assert_eq!(
            plan.actions[1].dependencies,
            [bucket()].into_iter().collect()
        );
        assert_eq!(plan.actions[1].description(), "Create aws_s3_object.a");
    }

    #[test]
    fn test_deletes_come_first_in_reverse_order() {
        // Recorded state: a bucket and an object, plus a record depending on the object
        let mut state = DeploymentState::new("shop", "dev");
        let record = Address::managed("aws_route53_record", "alias");
        state.set_resource(ResourceState::new(bucket(), "x", BTreeSet::new()));
        state.set_resource(ResourceState::new(object("old"), "x", [bucket()].into_iter().collect()));
        state.set_resource(ResourceState::new(record.clone(), "x", [object("old")].into_iter().collect()));

        let descriptor = site(&["new"]);
        let plan = plan(&descriptor, Some(&state));

        let order: Vec<String> = plan.addresses();
        assert_eq!(
            order,
            [
                "aws_route53_record.alias",
                "aws_s3_object.old",
                "aws_s3_bucket.bucket",
                "aws_s3_object.new",
            ]
        );
        assert_eq!(plan.count(ActionType::Delete), 2);
        assert_eq!(plan.actions[2].action_type, ActionType::Update);
        assert_eq!(
            plan.actions[1].dependencies,
            [record].into_iter().collect()
        );
    }

    #[test]
    fn test_empty_plan_after_apply() {
        let descriptor = site(&["a"]);
        let engine = DiffEngine::new();
        let mut state = DeploymentState::new("shop", "dev");
        for (address, hash) in engine.desired_hashes(&descriptor) {
            state.set_resource(ResourceState::new(address, &hash, BTreeSet::new()));
        }

        let plan = plan(&descriptor, Some(&state));
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 2);
        assert_eq!(plan.to_string(), "No changes required");
    }

    #[test]
    fn test_plan_serializes_addresses_as_strings() {
        let plan = plan(&site(&[]), None);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["actions"][0]["address"], "aws_s3_bucket.bucket");
        assert_eq!(json["actions"][0]["action_type"], "create");
    }
}
