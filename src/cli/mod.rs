//! CLI module for the plan harness.
//!
//! This module provides the command-line interface for running and
//! inspecting plan-validation suites.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
