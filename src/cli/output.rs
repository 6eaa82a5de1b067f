//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::descriptor::{Address, DependencyGraph};
use crate::planner::{ActionType, DeploymentPlan, ExecutionResult};
use crate::state::{DeploymentState, LockInfo};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Resource row for graph and state tables.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    address: String,
    #[tabled(rename = "Depends on")]
    dependencies: String,
}

/// Output row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when emitting JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    fn format_plan_text(plan: &DeploymentPlan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - infrastructure is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::new();

        let _ = writeln!(output, "\nDeployment Plan");
        let _ = write!(output, "   Config hash: {}\n\n", short(&plan.config_hash));

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.address.to_string(),
                reason: Self::truncate(&a.reason, 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            output.push_str("\nDetailed changes:\n");
            for action in &plan.actions {
                let _ = writeln!(output, "   {}", action.description());
                if let Some(hash) = &action.new_hash {
                    let _ = writeln!(output, "      hash: {}", short(hash));
                }
                if !action.dependencies.is_empty() {
                    let _ = writeln!(output, "      after: {}", join(&action.dependencies));
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to destroy, {} unchanged\n",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Delete).to_string().red(),
            plan.unchanged
        );

        output
    }

    /// Formats the outcome of an apply or destroy.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::json!({
                "success": result.success,
                "resources": result.resources,
                "outputs": result.outputs,
                "error": result.error,
            })
            .to_string(),
            OutputFormat::Text => {
                if result.success {
                    let mut output = format!(
                        "{} Complete: {} resources changed\n",
                        "✓".green(),
                        result.resources.len()
                    );
                    if !result.outputs.is_empty() {
                        output.push('\n');
                        output.push_str(&Self::format_outputs_text(&result.outputs));
                    }
                    output
                } else {
                    format!(
                        "{} Failed: {}\n",
                        "✗".red(),
                        result.error.as_deref().unwrap_or("unknown error")
                    )
                }
            }
        }
    }

    /// Formats a configuration validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::json!({
                "valid": result.is_valid(),
                "errors": result
                    .errors
                    .iter()
                    .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                    .collect::<Vec<_>>(),
                "warnings": result.warnings,
            })
            .to_string(),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the resolved resource order with direct dependencies.
    #[must_use]
    pub fn format_graph(&self, order: &[Address], graph: &DependencyGraph) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<serde_json::Value> = order
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "address": a.to_string(),
                            "depends_on": graph
                                .dependencies_of(a)
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<ResourceRow> = order
                    .iter()
                    .map(|a| ResourceRow {
                        address: a.to_string(),
                        dependencies: join(&graph.dependencies_of(a)),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats stack outputs.
    #[must_use]
    pub fn format_outputs(&self, outputs: &BTreeMap<String, String>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outputs).unwrap_or_default(),
            OutputFormat::Text => {
                if outputs.is_empty() {
                    String::from("No outputs recorded. Run 'edgesite apply' first.\n")
                } else {
                    Self::format_outputs_text(outputs)
                }
            }
        }
    }

    fn format_outputs_text(outputs: &BTreeMap<String, String>) -> String {
        let rows: Vec<OutputRow> = outputs
            .iter()
            .map(|(name, value)| OutputRow {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        format!("{}\n", Table::new(rows))
    }

    /// Formats a drift check result.
    #[must_use]
    pub fn format_drift(&self, drifted: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::json!({ "drift": drifted }).to_string(),
            OutputFormat::Text => {
                if drifted {
                    format!(
                        "{} Drift detected - real infrastructure differs from the descriptor.\n",
                        "⚠".yellow()
                    )
                } else {
                    format!("{} No drift detected - state is converged.\n", "✓".green())
                }
            }
        }
    }

    /// Formats deployment state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nState: {}/{}\n\n", state.project, state.environment);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Config hash: {}", short(&state.config_hash));
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.resources.len());
                match lock {
                    Some(info) => {
                        let _ = writeln!(
                            output,
                            "   Locked by: {} ({}s remaining)",
                            info.holder,
                            info.remaining_secs()
                        );
                    }
                    None => {
                        let _ = writeln!(output, "   Locked: no");
                    }
                }

                if !state.resources.is_empty() {
                    let rows: Vec<ResourceRow> = state
                        .resources
                        .values()
                        .map(|r| ResourceRow {
                            address: r.address.to_string(),
                            dependencies: join(&r.dependencies),
                        })
                        .collect();
                    let _ = write!(output, "\n{}\n", Table::new(rows));
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({} resources)",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.len()
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, symbol: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::json!({ "status": status, "message": message }).to_string()
            }
            OutputFormat::Text => format!("{symbol} {message}"),
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn join<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> String {
    addresses
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannedAction;
    use std::collections::BTreeSet;

    fn plan() -> DeploymentPlan {
        let mut plan = DeploymentPlan::empty("0123456789abcdef");
        plan.actions.push(PlannedAction {
            action_type: ActionType::Create,
            address: Address::managed("aws_s3_bucket", "bucket"),
            reason: String::from("New resource"),
            new_hash: Some(String::from("feedfacecafebeef")),
            dependencies: BTreeSet::new(),
        });
        plan.unchanged = 2;
        plan
    }

    #[test]
    fn test_plan_text_summary() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(&plan(), true);

        assert!(text.contains("aws_s3_bucket.bucket"));
        assert!(text.contains("01234567"));
        assert!(text.contains("hash: feedface"));
        assert!(text.contains("1 to create, 0 to update, 0 to destroy, 2 unchanged"));
    }

    #[test]
    fn test_plan_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&formatter.format_plan(&plan(), false)).unwrap();
        assert_eq!(value["actions"][0]["address"], "aws_s3_bucket.bucket");
        assert_eq!(value["actions"][0]["action_type"], "create");
    }

    #[test]
    fn test_empty_plan_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(&DeploymentPlan::empty("abc"), false);
        assert!(text.contains("No changes required"));
    }

    #[test]
    fn test_outputs() {
        let mut outputs = BTreeMap::new();
        outputs.insert(String::from("domainURL"), String::from("https://shop.example.com"));

        let text = OutputFormatter::new(OutputFormat::Text).format_outputs(&outputs);
        assert!(text.contains("domainURL"));
        assert!(text.contains("https://shop.example.com"));

        let json = OutputFormatter::new(OutputFormat::Json).format_outputs(&outputs);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["domainURL"], "https://shop.example.com");

        let empty = OutputFormatter::new(OutputFormat::Text).format_outputs(&BTreeMap::new());
        assert!(empty.contains("No outputs recorded"));
    }

    #[test]
    fn test_graph_lists_dependencies() {
        let mut graph = DependencyGraph::new();
        let bucket = Address::managed("aws_s3_bucket", "bucket");
        let policy = Address::managed("aws_s3_bucket_policy", "policy");
        graph.add_dependency(&policy, &bucket);
        let order = graph.resolve_order().unwrap();

        let text = OutputFormatter::new(OutputFormat::Text).format_graph(&order, &graph);
        assert!(text.contains("aws_s3_bucket_policy.policy"));

        let json = OutputFormatter::new(OutputFormat::Json).format_graph(&order, &graph);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[1]["depends_on"][0], "aws_s3_bucket.bucket");
    }

    #[test]
    fn test_messages_and_truncate() {
        let json = OutputFormatter::new(OutputFormat::Json).error("boom");
        assert!(json.contains("\"status\":\"error\""));
        assert_eq!(OutputFormatter::truncate("abcdefghij", 6), "abc...");
        assert_eq!(OutputFormatter::truncate("abc", 6), "abc");
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn test_drift() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        assert_eq!(formatter.format_drift(true), r#"{"drift":true}"#);
    }
}
