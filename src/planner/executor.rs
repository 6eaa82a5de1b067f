//! Plan executor: hands the descriptor to the engine and records the outcome.
//!
//! The engine does the actual provisioning. On success the executor records
//! the applied hashes, outputs and a history entry; on failure it records
//! only the failed history entry, leaving resource hashes untouched so the
//! next plan proposes the same changes again.

use std::path::Path;
use tracing::{error, info};

use crate::config::ProjectConfig;
use crate::descriptor::Descriptor;
use crate::engine::{ApplyEngine, DESCRIPTOR_FILE, EngineOutputs};
use crate::error::{EdgesiteError, PlanError, Result};
use crate::state::{DeploymentHistoryEntry, DeploymentOperation, DeploymentState, ResourceState};

use super::plan::{ActionType, DeploymentPlan};

/// Executor for deployment plans.
#[derive(Debug)]
pub struct PlanExecutor<'a, E: ApplyEngine + ?Sized> {
    /// Provisioning engine.
    engine: &'a E,
    /// Engine working directory.
    workdir: &'a Path,
    /// Record the plan without running the engine.
    skip_engine: bool,
}

/// Result of executing a plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Addresses the operation covered.
    pub resources: Vec<String>,
    /// Output values reported by the engine.
    pub outputs: EngineOutputs,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
}

impl<'a, E: ApplyEngine + ?Sized> PlanExecutor<'a, E> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(engine: &'a E, workdir: &'a Path) -> Self {
        Self {
            engine,
            workdir,
            skip_engine: false,
        }
    }

    /// Sets whether to skip running the engine.
    ///
    /// The descriptor is still written and the plan recorded as applied,
    /// for setups where the engine runs elsewhere.
    #[must_use]
    pub const fn with_skip_engine(mut self, skip_engine: bool) -> Self {
        self.skip_engine = skip_engine;
        self
    }

    /// Writes the rendered descriptor into the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn write_descriptor(&self, descriptor: &Descriptor) -> Result<()> {
        tokio::fs::create_dir_all(self.workdir).await?;
        let path = self.workdir.join(DESCRIPTOR_FILE);
        tokio::fs::write(&path, descriptor.to_json_pretty()?).await?;
        info!("Wrote {}", path.display());
        Ok(())
    }

    /// Executes a deployment plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be written. Engine failures
    /// are reported in the result and recorded in the state history.
    pub async fn execute(
        &self,
        plan: &DeploymentPlan,
        descriptor: &Descriptor,
        state: &mut DeploymentState,
    ) -> Result<ExecutionResult> {
        info!("Executing deployment plan with {} actions", plan.actions.len());

        if plan.is_empty() {
            return Ok(ExecutionResult {
                resources: vec![],
                outputs: state.outputs.clone(),
                success: true,
                error: None,
            });
        }

        self.write_descriptor(descriptor).await?;

        let resources = plan.addresses();

        let outputs = if self.skip_engine {
            info!("Skipping engine run");
            state.outputs.clone()
        } else {
            match self.run_apply().await {
                Ok(outputs) => outputs,
                Err(e) => {
                    error!("Apply failed: {e}");
                    state.add_history(DeploymentHistoryEntry::failed(
                        DeploymentOperation::Apply,
                        &plan.config_hash,
                        resources.clone(),
                        &e.to_string(),
                    ));
                    return Ok(ExecutionResult {
                        resources,
                        outputs: EngineOutputs::new(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        };

        for action in &plan.actions {
            match action.action_type {
                ActionType::Create | ActionType::Update => {
                    let dependencies = descriptor
                        .get(&action.address)
                        .map(crate::descriptor::Resource::dependencies)
                        .unwrap_or_default();
                    let hash = action.new_hash.as_deref().unwrap_or_default();
                    state.set_resource(ResourceState::new(action.address.clone(), hash, dependencies));
                }
                ActionType::Delete => {
                    state.remove_resource(&action.address.to_string());
                }
            }
        }

        state.set_outputs(outputs.clone());
        state.config_hash.clone_from(&plan.config_hash);
        state.add_history(DeploymentHistoryEntry::new(
            DeploymentOperation::Apply,
            &plan.config_hash,
            resources.clone(),
        ));

        info!("Applied {} changes", resources.len());
        Ok(ExecutionResult {
            resources,
            outputs,
            success: true,
            error: None,
        })
    }

    /// Destroys everything recorded in the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be written. Engine failures
    /// are reported in the result and recorded in the state history.
    pub async fn destroy(&self, descriptor: &Descriptor, state: &mut DeploymentState) -> Result<ExecutionResult> {
        let resources: Vec<String> = state.resource_addresses().into_iter().map(String::from).collect();
        let config_hash = state.config_hash.clone();
        info!("Destroying {} resources", resources.len());

        self.write_descriptor(descriptor).await?;

        if !self.skip_engine {
            let outcome = async {
                self.engine.init().await?;
                self.engine.destroy().await
            }
            .await;

            if let Err(e) = outcome {
                error!("Destroy failed: {e}");
                state.add_history(DeploymentHistoryEntry::failed(
                    DeploymentOperation::Destroy,
                    &config_hash,
                    resources.clone(),
                    &e.to_string(),
                ));
                return Ok(ExecutionResult {
                    resources,
                    outputs: EngineOutputs::new(),
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        }

        state.clear();
        state.add_history(DeploymentHistoryEntry::new(
            DeploymentOperation::Destroy,
            &config_hash,
            resources.clone(),
        ));

        Ok(ExecutionResult {
            resources,
            outputs: EngineOutputs::new(),
            success: true,
            error: None,
        })
    }

    async fn run_apply(&self) -> Result<EngineOutputs> {
        info!("Handing descriptor to {}", self.engine.name());
        self.engine.init().await?;
        self.engine.apply().await?;
        self.engine.outputs().await
    }
}

/// Rejects state recorded for a different project or environment.
///
/// # Errors
///
/// Returns [`PlanError::StackMismatch`] on mismatch.
pub fn check_stack(state: &DeploymentState, project: &ProjectConfig) -> Result<()> {
    if state.project != project.name || state.environment != project.environment {
        return Err(EdgesiteError::Plan(PlanError::StackMismatch {
            expected: format!("{}/{}", project.name, project.environment),
            found: format!("{}/{}", state.project, state.environment),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Address, Props, Resource};
    use crate::engine::MockApplyEngine;
    use crate::error::EngineError;
    use crate::planner::DiffEngine;
    use tempfile::TempDir;

    fn site(objects: &[(&str, &str)]) -> Descriptor {
        let mut descriptor = Descriptor::new();
        let bucket = Address::managed("aws_s3_bucket", "bucket");
        descriptor
            .add(Resource::new(bucket.clone(), Props::new().set("bucket_prefix", "shop-")))
            .unwrap();
        for (name, digest) in objects {
            descriptor
                .add(Resource::new(
                    Address::managed("aws_s3_object", name),
                    Props::new().set("bucket", bucket.attr("id")).set("source_hash", *digest),
                ))
                .unwrap();
        }
        descriptor
    }

    fn plan(descriptor: &Descriptor, state: &DeploymentState) -> DeploymentPlan {
        let diff = DiffEngine::new().compute_diff(descriptor, Some(state));
        DeploymentPlan::from_diff(&diff, descriptor, "cfg-1").unwrap()
    }

    fn succeeding_engine() -> MockApplyEngine {
        let mut engine = MockApplyEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_init().times(1).returning(|| Ok(()));
        engine.expect_apply().times(1).returning(|| Ok(()));
        engine.expect_outputs().times(1).returning(|| {
            Ok([(String::from("cdnURL"), String::from("https://d1.cloudfront.net"))].into())
        });
        engine
    }

    #[tokio::test]
    async fn test_apply_records_state_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let engine = succeeding_engine();
        let executor = PlanExecutor::new(&engine, temp.path());

        let descriptor = site(&[("index", "aa"), ("error", "bb")]);
        let mut state = DeploymentState::new("shop", "dev");
        let first = plan(&descriptor, &state);
        assert_eq!(first.action_count(), 3);

        let result = executor.execute(&first, &descriptor, &mut state).await.unwrap();
        assert!(result.success);
        assert_eq!(state.resources.len(), 3);
        assert_eq!(state.config_hash, "cfg-1");
        assert_eq!(state.outputs["cdnURL"], "https://d1.cloudfront.net");
        assert!(state.last_operation().unwrap().success);

        let written = std::fs::read_to_string(temp.path().join(DESCRIPTOR_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert!(json["resource"]["aws_s3_object"]["index"].is_object());

        // Same inputs: nothing to do, and the engine is not called again
        let second = plan(&descriptor, &state);
        assert!(second.is_empty());
        let result = executor.execute(&second, &descriptor, &mut state).await.unwrap();
        assert!(result.success);
        assert!(result.resources.is_empty());
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_pending_changes() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockApplyEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_init().returning(|| Ok(()));
        engine.expect_apply().returning(|| {
            Err(EngineError::command_failed("terraform apply", Some(1), "validation timed out").into())
        });
        engine.expect_outputs().never();

        let executor = PlanExecutor::new(&engine, temp.path());
        let descriptor = site(&[("index", "aa")]);
        let mut state = DeploymentState::new("shop", "dev");
        let pending = plan(&descriptor, &state);

        let result = executor.execute(&pending, &descriptor, &mut state).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("validation timed out"));
        assert!(state.resources.is_empty());

        let entry = state.last_operation().unwrap();
        assert!(!entry.success);
        assert_eq!(entry.resources.len(), 2);

        assert_eq!(plan(&descriptor, &state).action_count(), 2);
    }

    #[tokio::test]
    async fn test_removed_object_is_forgotten() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockApplyEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_init().times(2).returning(|| Ok(()));
        engine.expect_apply().times(2).returning(|| Ok(()));
        engine.expect_outputs().times(2).returning(|| Ok(EngineOutputs::new()));
        let executor = PlanExecutor::new(&engine, temp.path());

        let mut state = DeploymentState::new("shop", "dev");
        let before = site(&[("index", "aa"), ("old", "bb")]);
        executor
            .execute(&plan(&before, &state), &before, &mut state)
            .await
            .unwrap();

        let after = site(&[("index", "aa")]);
        let removal = plan(&after, &state);
        assert_eq!(removal.count(ActionType::Delete), 1);
        executor.execute(&removal, &after, &mut state).await.unwrap();

        assert!(state.get_resource("aws_s3_object.old").is_none());
        assert_eq!(state.resources.len(), 2);
    }

    #[tokio::test]
    async fn test_skip_engine_records_without_running() {
        let temp = TempDir::new().unwrap();
        let engine = MockApplyEngine::new();
        let executor = PlanExecutor::new(&engine, temp.path()).with_skip_engine(true);

        let descriptor = site(&[("index", "aa")]);
        let mut state = DeploymentState::new("shop", "dev");
        let result = executor
            .execute(&plan(&descriptor, &state), &descriptor, &mut state)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(state.resources.len(), 2);
        assert!(temp.path().join(DESCRIPTOR_FILE).exists());
    }

    #[tokio::test]
    async fn test_destroy_clears_state() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockApplyEngine::new();
        engine.expect_init().times(1).returning(|| Ok(()));
        engine.expect_destroy().times(1).returning(|| Ok(()));
        let executor = PlanExecutor::new(&engine, temp.path());

        let descriptor = site(&[("index", "aa")]);
        let mut state = DeploymentState::new("shop", "dev");
        state.set_resource(ResourceState::new(
            Address::managed("aws_s3_bucket", "bucket"),
            "h",
            std::collections::BTreeSet::new(),
        ));
        state.config_hash = String::from("cfg-1");

        let result = executor.destroy(&descriptor, &mut state).await.unwrap();
        assert!(result.success);
        assert_eq!(result.resources, ["aws_s3_bucket.bucket"]);
        assert!(state.resources.is_empty());

        let entry = state.last_operation().unwrap();
        assert_eq!(entry.operation, DeploymentOperation::Destroy);
        assert_eq!(entry.config_hash, "cfg-1");
    }

    #[test]
    fn test_check_stack() {
        let project = ProjectConfig {
            name: String::from("shop"),
            environment: String::from("prod"),
            region: String::from("us-west-2"),
        };

        assert!(check_stack(&DeploymentState::new("shop", "prod"), &project).is_ok());
        let err = check_stack(&DeploymentState::new("shop", "dev"), &project).unwrap_err();
        assert!(err.to_string().contains("shop/dev"), "got: {err}");
    }
}
