//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// edgesite - Declarative static-website deployment on S3 and CloudFront.
#[derive(Parser, Debug)]
#[command(name = "edgesite")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "EDGESITE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new site project.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the deployment configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Render the deployment descriptor.
    Synth {
        /// Write to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List declared resources in dependency order.
    Graph,

    /// Generate and display the deployment plan.
    Plan {
        /// Show hashes and dependencies of each action.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply the deployment plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Write the descriptor and record the plan without running the engine.
        #[arg(long)]
        skip_engine: bool,
    },

    /// Show the outputs of the last apply.
    Outputs,

    /// Check for drift between the descriptor and real infrastructure.
    Drift,

    /// Destroy all deployed resources.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage state backend.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from(["edgesite", "--output", "json", "apply", "--yes", "--skip-engine"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Apply {
                yes: true,
                skip_engine: true
            }
        ));
    }

    #[test]
    fn test_parse_state_unlock() {
        let cli = Cli::try_parse_from(["edgesite", "state", "unlock", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Unlock { lock_id: None, force: true }
            }
        ));
    }

    #[test]
    fn test_parse_synth_out() {
        let cli = Cli::try_parse_from(["edgesite", "-c", "site.yaml", "synth", "--out", "main.tf.json"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("site.yaml")));
        assert!(matches!(cli.command, Commands::Synth { out: Some(_) }));
    }
}
