//! Planning module for deployment operations.
//!
//! This module compares the desired descriptor with the recorded state,
//! orders the resulting changes by the dependency graph, and executes the
//! plan through the provisioning engine.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use executor::{ExecutionResult, PlanExecutor, check_stack};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
