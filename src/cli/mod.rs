//! Command-line interface for edgesite.
//!
//! This module provides the clap command definitions and the
//! formatters used to print plans, state and outputs.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
