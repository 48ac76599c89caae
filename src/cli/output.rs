//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{SuiteConfig, ValidationResult};
use crate::plan::{ActionKind, PlanGraph, ResourceChange};
use crate::runner::{ScenarioOutcome, ScenarioReport, SuiteReport};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Scenario result row for table display.
#[derive(Tabled)]
struct ScenarioRow {
    #[tabled(rename = "Scenario")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Result")]
    outcome: String,
    #[tabled(rename = "Assertions")]
    assertions: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Time")]
    duration: String,
}

/// Suite scenario row for `list`.
#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "Scenario")]
    name: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Assertions")]
    assertions: usize,
    #[tabled(rename = "Idempotence")]
    idempotent: String,
}

/// Resource change row for `inspect`.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Type")]
    resource_type: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a suite report.
    #[must_use]
    pub fn format_suite(&self, report: &SuiteReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => Self::format_suite_text(report),
        }
    }

    fn format_suite_text(report: &SuiteReport) -> String {
        let mut output = String::new();

        if report.scenarios.is_empty() {
            return format!("{} No scenarios matched.\n", "!".yellow());
        }

        let rows: Vec<ScenarioRow> = report
            .scenarios
            .iter()
            .map(|s| ScenarioRow {
                name: s.name.clone(),
                mode: s.mode.to_string(),
                outcome: Self::format_outcome(s.outcome),
                assertions: format!(
                    "{}/{}",
                    s.assertions.evaluated.saturating_sub(s.assertions.failures.len()),
                    s.assertions.evaluated + s.assertions.skipped
                ),
                attempts: s.attempts,
                duration: format_duration(s.duration_ms),
            })
            .collect();

        output.push('\n');
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        for scenario in report.scenarios.iter().filter(|s| !s.passed()) {
            Self::write_scenario_details(&mut output, scenario);
        }

        for scenario in report.scenarios.iter().filter(|s| !s.teardown_warnings.is_empty()) {
            let _ = write!(output, "\n{} Teardown warnings for {}:\n", "!".yellow(), scenario.name);
            for warning in &scenario.teardown_warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        let summary = if report.passed() {
            "PASSED".green().bold().to_string()
        } else {
            "FAILED".red().bold().to_string()
        };
        let _ = write!(
            output,
            "\n{summary}: {} passed, {} failed ({})\n",
            report.passed_count().to_string().green(),
            report.failed_count().to_string().red(),
            format_duration(report.duration_ms)
        );

        output
    }

    fn write_scenario_details(output: &mut String, scenario: &ScenarioReport) {
        let _ = write!(
            output,
            "\n{} {} ({})\n",
            "x".red(),
            scenario.name.bold(),
            scenario.target.display()
        );
        if let Some(error) = &scenario.error {
            let _ = writeln!(output, "   {error}");
        }
        for failure in &scenario.failures {
            let _ = writeln!(output, "   - {failure}");
        }
        if scenario.assertions.skipped > 0 {
            let _ = writeln!(
                output,
                "   ({} assertions skipped after the first failure)",
                scenario.assertions.skipped
            );
        }
    }

    /// Formats the scenario list of a suite.
    #[must_use]
    pub fn format_scenarios(&self, suite: &SuiteConfig) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<ScenarioJson> = suite
                    .scenarios
                    .iter()
                    .map(|s| ScenarioJson {
                        name: s.name.clone(),
                        description: s.description.clone(),
                        target: s.target.display().to_string(),
                        mode: s.effective_mode(&suite.defaults).to_string(),
                        assertions: s.assertions.len(),
                        verify_idempotent: s.verify_idempotent,
                    })
                    .collect();
                to_json(&entries)
            }
            OutputFormat::Text => {
                let rows: Vec<ListRow> = suite
                    .scenarios
                    .iter()
                    .map(|s| ListRow {
                        name: s.name.clone(),
                        target: truncate(&s.target.display().to_string(), 50),
                        mode: s.effective_mode(&suite.defaults).to_string(),
                        assertions: s.assertions.len(),
                        idempotent: if s.verify_idempotent { "yes" } else { "" }.to_string(),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a plan graph.
    #[must_use]
    pub fn format_graph(&self, graph: &PlanGraph) -> String {
        match self.format {
            OutputFormat::Json => to_json(&GraphJson {
                format_version: graph.format_version.clone(),
                engine_version: graph.engine_version.clone(),
                action_counts: graph.action_counts(),
                resources: graph.iter().collect(),
                planned_values: graph.planned_addresses().iter().cloned().collect(),
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(
                    output,
                    "\nPlan format {} ({})\n\n",
                    graph.format_version,
                    graph.engine_version.as_deref().unwrap_or("unknown engine version")
                );

                if graph.is_empty() {
                    output.push_str("   No resource changes.\n");
                    return output;
                }

                let rows: Vec<ChangeRow> = graph
                    .iter()
                    .map(|c| ChangeRow {
                        action: Self::format_action(&c.action),
                        address: c.address.clone(),
                        resource_type: c.resource_type.as_str().to_string(),
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let counts: Vec<String> = graph
                    .action_counts()
                    .iter()
                    .map(|(action, count)| format!("{count} {action}"))
                    .collect();
                let _ = write!(output, "\n{} resources: {}\n", graph.len(), counts.join(", "));
                output
            }
        }
    }

    /// Formats one resource change with its snapshots.
    #[must_use]
    pub fn format_change(&self, change: &ResourceChange) -> String {
        match self.format {
            OutputFormat::Json => to_json(change),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(
                    output,
                    "\n{} {}\n   type: {}\n",
                    Self::format_action(&change.action),
                    change.address.bold(),
                    change.resource_type.as_str()
                );
                if let Some(module) = &change.module_address {
                    let _ = writeln!(output, "   module: {module}");
                }
                if let Some(provider) = &change.provider_name {
                    let _ = writeln!(output, "   provider: {provider}");
                }
                for (label, snapshot) in [("before", &change.before), ("after", &change.after)] {
                    match snapshot {
                        Some(values) => {
                            let rendered = serde_json::to_string_pretty(values).unwrap_or_default();
                            let _ = write!(output, "\n   {label}:\n{}\n", indent(&rendered, 6));
                        }
                        None => {
                            let _ = write!(output, "\n   {label}: {}\n", "(none)".dimmed());
                        }
                    }
                }
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                valid: result.is_valid(),
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: if show_warnings { result.warnings.clone() } else { Vec::new() },
            }),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Suite is valid.\n", "ok".green())
                } else {
                    let mut text = format!("{} Suite has {} errors:\n", "x".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(text, "   - {error}");
                    }
                    text
                };

                if show_warnings && result.warning_count() > 0 {
                    let _ = write!(output, "\n{} Warnings:\n", "!".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "   ({} warnings, use --warnings to show them)",
                        result.warning_count()
                    );
                }
                output
            }
        }
    }

    /// Formats a scenario outcome with color.
    fn format_outcome(outcome: ScenarioOutcome) -> String {
        match outcome {
            ScenarioOutcome::Passed => outcome.as_str().green().to_string(),
            ScenarioOutcome::Failed => outcome.as_str().red().to_string(),
            ScenarioOutcome::InvocationFailed
            | ScenarioOutcome::ParseFailed
            | ScenarioOutcome::Panicked => outcome.as_str().red().bold().to_string(),
        }
    }

    /// Formats an action kind with color.
    fn format_action(action: &ActionKind) -> String {
        match action {
            ActionKind::Create => "+create".green().to_string(),
            ActionKind::Update => "~update".yellow().to_string(),
            ActionKind::Delete => "-delete".red().to_string(),
            ActionKind::Replace => "-/+replace".red().to_string(),
            ActionKind::Read => "<=read".cyan().to_string(),
            ActionKind::NoOp => "no-op".dimmed().to_string(),
            ActionKind::Other(raw) => raw.yellow().to_string(),
        }
    }
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        format!("{}.{}s", ms / 1_000, (ms % 1_000) / 100)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct ScenarioJson {
    name: String,
    description: Option<String>,
    target: String,
    mode: String,
    assertions: usize,
    verify_idempotent: bool,
}

#[derive(Serialize)]
struct GraphJson<'a> {
    format_version: String,
    engine_version: Option<String>,
    action_counts: std::collections::BTreeMap<String, usize>,
    resources: Vec<&'a ResourceChange>,
    planned_values: Vec<String>,
}

#[derive(Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}
