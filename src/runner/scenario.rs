//! Scenario definition and lifecycle phases.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::assertions::Assertion;
use crate::config::{DefaultsConfig, ScenarioConfig};
use crate::engine::ExecutionMode;
use crate::error::ConfigError;
use crate::params::ParameterSet;

/// Lifecycle phase of a scenario run.
///
/// `Built -> Planned -> Asserted -> TornDown`, with `InvocationFailed` and
/// `ParseFailed` reachable before assertions. Every path ends in `TornDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    /// Parameters rendered, nothing invoked yet.
    Built,
    /// The engine produced a plan document.
    Planned,
    /// Assertions were evaluated.
    Asserted,
    /// The engine failed.
    InvocationFailed,
    /// The plan document could not be read.
    ParseFailed,
    /// Cleanup finished.
    TornDown,
}

impl ScenarioPhase {
    /// Returns true if `next` is a legal successor.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Built, Self::Planned | Self::InvocationFailed)
                | (Self::Planned, Self::Asserted | Self::ParseFailed | Self::InvocationFailed)
                | (
                    Self::Built
                        | Self::Planned
                        | Self::Asserted
                        | Self::InvocationFailed
                        | Self::ParseFailed,
                    Self::TornDown
                )
        )
    }

    /// Returns the phase as text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Planned => "planned",
            Self::Asserted => "asserted",
            Self::InvocationFailed => "invocation_failed",
            Self::ParseFailed => "parse_failed",
            Self::TornDown => "torn_down",
        }
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named combination of target, parameters and assertions.
///
/// Immutable once built; the parameter set and assertions are shared with
/// the task that runs it.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    target: PathBuf,
    params: Arc<ParameterSet>,
    mode: ExecutionMode,
    assertions: Arc<[Assertion]>,
    fail_fast: bool,
    verify_idempotent: bool,
}

impl Scenario {
    /// Creates a plan-only scenario without assertions.
    #[must_use]
    pub fn new(name: impl Into<String>, target: impl Into<PathBuf>, params: ParameterSet) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            params: Arc::new(params),
            mode: ExecutionMode::default(),
            assertions: Arc::from(Vec::new()),
            fail_fast: false,
            verify_idempotent: false,
        }
    }

    /// Builds a scenario from its suite entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the variables do not form a parameter set.
    pub fn from_config(config: &ScenarioConfig, defaults: &DefaultsConfig) -> Result<Self, ConfigError> {
        let params = ParameterSet::from_yaml(&config.vars)?;
        Ok(Self::new(&config.name, &config.target, params)
            .with_mode(config.effective_mode(defaults))
            .with_assertions(config.assertions.clone())
            .with_fail_fast(config.effective_fail_fast(defaults))
            .with_idempotence_check(config.verify_idempotent))
    }

    /// Sets the execution mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the assertions.
    #[must_use]
    pub fn with_assertions(mut self, assertions: Vec<Assertion>) -> Self {
        self.assertions = Arc::from(assertions);
        self
    }

    /// Stops assertion evaluation at the first failure.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Plans a second time and requires a stable result.
    #[must_use]
    pub const fn with_idempotence_check(mut self, enabled: bool) -> Self {
        self.verify_idempotent = enabled;
        self
    }

    /// Scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target configuration directory.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Input parameters.
    #[must_use]
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Execution mode.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Assertions, in evaluation order.
    #[must_use]
    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    /// Whether assertion evaluation stops at the first failure.
    #[must_use]
    pub const fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Whether a second plan must match the first.
    #[must_use]
    pub const fn verify_idempotent(&self) -> bool {
        self.verify_idempotent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        use ScenarioPhase::{Asserted, Built, InvocationFailed, ParseFailed, Planned, TornDown};

        assert!(Built.can_advance_to(Planned));
        assert!(Built.can_advance_to(InvocationFailed));
        assert!(Planned.can_advance_to(ParseFailed));
        assert!(Planned.can_advance_to(Asserted));
        assert!(Asserted.can_advance_to(TornDown));
        assert!(InvocationFailed.can_advance_to(TornDown));

        assert!(!Built.can_advance_to(Asserted));
        assert!(!Asserted.can_advance_to(Planned));
        assert!(!TornDown.can_advance_to(TornDown));
    }

    #[test]
    fn test_from_config_applies_defaults() {
        let config: ScenarioConfig = serde_yaml::from_str(
            r"
name: naming
target: modules/cosmosdb
vars:
  environment: prod
verify_idempotent: true
assertions:
  - address_exists: azurerm_cosmosdb_account.main
",
        )
        .unwrap();
        let defaults = DefaultsConfig {
            mode: ExecutionMode::PlanAndApply,
            fail_fast: true,
        };

        let scenario = Scenario::from_config(&config, &defaults).unwrap();
        assert_eq!(scenario.name(), "naming");
        assert_eq!(scenario.mode(), ExecutionMode::PlanAndApply);
        assert!(scenario.fail_fast());
        assert!(scenario.verify_idempotent());
        assert_eq!(scenario.assertions().len(), 1);
        assert_eq!(scenario.params().get("environment").and_then(|v| v.as_str()), Some("prod"));
    }
}
