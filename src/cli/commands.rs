//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SUITE_ENV_VAR;

/// Plan harness - validate infrastructure configurations by planning them.
#[derive(Parser, Debug)]
#[command(name = "plan-harness")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the suite file.
    #[arg(short, long, global = true, env = SUITE_ENV_VAR)]
    pub suite: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the suite's scenarios.
    Run {
        /// Only run scenarios whose name contains this text.
        #[arg(short, long)]
        filter: Option<String>,

        /// Maximum number of concurrent scenarios (overrides the suite).
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,

        /// Stop each scenario at its first failed assertion.
        #[arg(long)]
        fail_fast: bool,

        /// Keep rendered variables and saved plans.
        #[arg(long)]
        keep_artifacts: bool,
    },

    /// Validate the suite file.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List the suite's scenarios.
    List,

    /// Parse a saved plan document and show its resource graph.
    Inspect {
        /// Plan document (`show -json` output).
        plan: PathBuf,

        /// Show one record's snapshots.
        #[arg(short, long)]
        address: Option<String>,
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
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "plan-harness",
            "--suite",
            "suite.yaml",
            "run",
            "--filter",
            "naming",
            "-j",
            "2",
            "--fail-fast",
        ])
        .unwrap();

        assert_eq!(cli.suite, Some(PathBuf::from("suite.yaml")));
        match cli.command {
            Commands::Run {
                filter,
                parallelism,
                fail_fast,
                keep_artifacts,
            } => {
                assert_eq!(filter.as_deref(), Some("naming"));
                assert_eq!(parallelism, Some(2));
                assert!(fail_fast);
                assert!(!keep_artifacts);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_inspect_with_json_output() {
        let cli = Cli::try_parse_from(["plan-harness", "inspect", "plan.json", "--output", "json"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Inspect { address: None, .. }));
    }
}
