//! Scenario and suite reports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::assertions::AssertionReport;
use crate::engine::ExecutionMode;

use super::scenario::{Scenario, ScenarioPhase};

/// How a scenario ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Every assertion held.
    Passed,
    /// At least one assertion or the idempotence check failed.
    Failed,
    /// The engine failed.
    InvocationFailed,
    /// The plan document could not be read.
    ParseFailed,
    /// The scenario task panicked.
    Panicked,
}

impl ScenarioOutcome {
    /// Returns the outcome as text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::InvocationFailed => "invocation failed",
            Self::ParseFailed => "parse failed",
            Self::Panicked => "panicked",
        }
    }
}

/// Result of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Target directory.
    pub target: PathBuf,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Final outcome.
    pub outcome: ScenarioOutcome,
    /// Phases visited, in order.
    pub phases: Vec<ScenarioPhase>,
    /// Assertion results.
    pub assertions: AssertionReport,
    /// Failure messages (assertions and idempotence).
    pub failures: Vec<String>,
    /// Invocation or parse error text.
    pub error: Option<String>,
    /// Non-fatal teardown problems.
    pub teardown_warnings: Vec<String>,
    /// Engine invocations, including retries.
    pub attempts: u32,
    /// Records per action kind in the plan.
    pub action_counts: BTreeMap<String, usize>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// Creates a report in the `Built` phase.
    #[must_use]
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name().to_string(),
            target: scenario.target().to_path_buf(),
            mode: scenario.mode(),
            outcome: ScenarioOutcome::Passed,
            phases: vec![ScenarioPhase::Built],
            assertions: AssertionReport::default(),
            failures: Vec::new(),
            error: None,
            teardown_warnings: Vec::new(),
            attempts: 0,
            action_counts: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    /// Report for a scenario whose task died.
    #[must_use]
    pub fn panicked(mut self, message: impl Into<String>) -> Self {
        self.outcome = ScenarioOutcome::Panicked;
        self.error = Some(message.into());
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ScenarioPhase {
        self.phases.last().copied().unwrap_or(ScenarioPhase::Built)
    }

    /// Records a phase change.
    pub fn advance(&mut self, next: ScenarioPhase) {
        let current = self.phase();
        if !current.can_advance_to(next) {
            warn!("Scenario {}: unexpected phase change {} -> {}", self.name, current, next);
        }
        self.phases.push(next);
    }

    /// Records an invocation or parse failure.
    pub fn fail(&mut self, outcome: ScenarioOutcome, phase: ScenarioPhase, error: impl Into<String>) {
        self.outcome = outcome;
        self.error = Some(error.into());
        self.advance(phase);
    }

    /// Adds a failure message that is not tied to one assertion.
    pub fn add_failure(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
        if self.outcome == ScenarioOutcome::Passed {
            self.outcome = ScenarioOutcome::Failed;
        }
    }

    /// Records assertion results.
    pub fn record_assertions(&mut self, report: AssertionReport) {
        for message in report.messages() {
            self.add_failure(message);
        }
        self.assertions = report;
    }

    /// Returns true if the scenario passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == ScenarioOutcome::Passed
    }

    /// Returns true if teardown ran.
    #[must_use]
    pub fn torn_down(&self) -> bool {
        self.phase() == ScenarioPhase::TornDown
    }
}

/// Results of a suite run, in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    /// Scenario reports.
    pub scenarios: Vec<ScenarioReport>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl SuiteReport {
    /// Returns true if every scenario passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// Number of passed scenarios.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed()).count()
    }

    /// Number of failed scenarios.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.scenarios.len() - self.passed_count()
    }

    /// Process exit code: 0 when every scenario passed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.passed())
    }

    /// Looks up a scenario report by name.
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}
