//! Suite validation.
//!
//! This module checks a parsed suite before anything runs: engine and retry
//! settings, scenario identity, parameter sets and assertion targets. All
//! problems are collected so one pass reports every error.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::assertions::{Assertion, ParamCondition};
use crate::error::{ConfigError, HarnessError, Result};
use crate::params::ParameterSet;

use super::spec::{EngineConfig, RetryConfig, ScenarioConfig, SuiteConfig};

/// Validator for suite files.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Skip the target-existence warning (used when listing suites).
    skip_target_check: bool,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            skip_target_check: false,
        }
    }

    /// Disables the target-existence warning.
    #[must_use]
    pub const fn without_target_check(mut self) -> Self {
        self.skip_target_check = true;
        self
    }

    /// Validates a suite.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails; use [`Self::check`] to
    /// get every error.
    pub fn validate(&self, suite: &SuiteConfig) -> Result<ValidationResult> {
        let result = self.check(suite);

        if result.errors.is_empty() {
            debug!("Suite validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(HarnessError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Collects every error and warning.
    #[must_use]
    pub fn check(&self, suite: &SuiteConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_engine(&suite.engine, &mut result);
        Self::validate_retry(&suite.retry, &mut result);
        self.validate_scenarios(&suite.scenarios, &mut result);

        result
    }

    /// Validates engine configuration.
    fn validate_engine(engine: &EngineConfig, result: &mut ValidationResult) {
        if engine.binary.trim().is_empty() {
            result.error("engine.binary", "Engine binary cannot be empty");
        }
        if engine.timeout_secs == 0 {
            result.error("engine.timeout_secs", "Step timeout must be at least 1 second");
        }
        if engine.parallelism == 0 {
            result.error("engine.parallelism", "Parallelism must be at least 1");
        }
    }

    /// Validates retry configuration.
    fn validate_retry(retry: &RetryConfig, result: &mut ValidationResult) {
        if retry.max_attempts == 0 {
            result.error("retry.max_attempts", "Retry attempts must be at least 1");
        }

        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            result.error(
                "retry.multiplier",
                format!("Backoff multiplier must be >= 1.0, got {}", retry.multiplier),
            );
        }

        if retry.initial_backoff_ms > retry.max_backoff_ms {
            result.warnings.push(format!(
                "retry: initial_backoff_ms ({}) exceeds max_backoff_ms ({}); every delay is capped",
                retry.initial_backoff_ms, retry.max_backoff_ms
            ));
        }

        for (i, pattern) in retry.retryable_errors.iter().flatten().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                result.error(
                    format!("retry.retryable_errors[{i}]"),
                    format!("Invalid regex '{pattern}': {e}"),
                );
            }
        }
    }

    /// Validates all scenarios.
    fn validate_scenarios(&self, scenarios: &[ScenarioConfig], result: &mut ValidationResult) {
        if scenarios.is_empty() {
            result.error("scenarios", "Suite must define at least one scenario");
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, scenario) in scenarios.iter().enumerate() {
            let prefix = format!("scenarios[{i}]");

            if !seen_names.insert(scenario.name.as_str()) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Duplicate scenario name: {}", scenario.name),
                );
            }

            if !is_valid_name(&scenario.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Scenario name '{}' is invalid. Must be lowercase alphanumeric with '-' or '_'.",
                        scenario.name
                    ),
                );
            }

            if scenario.target.as_os_str().is_empty() {
                result.error(format!("{prefix}.target"), "Target cannot be empty");
            } else if !self.skip_target_check && !scenario.target.is_dir() {
                result.warnings.push(format!(
                    "{prefix}.target: {} is not a directory",
                    scenario.target.display()
                ));
            }

            if let Err(e) = ParameterSet::from_yaml(&scenario.vars) {
                result.error(format!("{prefix}.vars"), e.to_string());
            }

            if scenario.assertions.is_empty() {
                result.warnings.push(format!(
                    "{prefix}: Scenario '{}' has no assertions; only invocation is checked",
                    scenario.name
                ));
            }

            for (j, assertion) in scenario.assertions.iter().enumerate() {
                Self::validate_assertion(assertion, &format!("{prefix}.assertions[{j}]"), result);
            }
        }
    }

    /// Validates one assertion's targets.
    fn validate_assertion(assertion: &Assertion, field: &str, result: &mut ValidationResult) {
        match assertion {
            Assertion::AddressExists(address)
            | Assertion::Absent(address)
            | Assertion::PlannedValueExists(address) => {
                require_non_empty(address, field, "address", result);
            }
            Assertion::AttributeContains(check) => {
                match (&check.address, &check.resource_type) {
                    (Some(address), None) => require_non_empty(address, field, "address", result),
                    (None, Some(resource_type)) => require_non_empty(resource_type, field, "type", result),
                    _ => result.error(field, "attribute_contains needs exactly one of 'address' or 'type'"),
                }
                if check.substring.is_empty() {
                    result
                        .warnings
                        .push(format!("{field}: empty substring matches any string-like value"));
                }
            }
            Assertion::ConditionalInclusion(check) => {
                require_non_empty(&check.address, field, "address", result);
                if !condition_is_valid(&check.when) {
                    result.error(format!("{field}.when"), "Condition names an empty parameter");
                }
            }
            Assertion::ActionIs(check) => require_non_empty(&check.address, field, "address", result),
            Assertion::ResourceCount(check) => {
                require_non_empty(&check.resource_type, field, "type", result);
            }
        }
    }
}

fn require_non_empty(value: &str, field: &str, name: &str, result: &mut ValidationResult) {
    if value.trim().is_empty() {
        result.error(format!("{field}.{name}"), format!("Assertion {name} cannot be empty"));
    }
}

fn condition_is_valid(condition: &ParamCondition) -> bool {
    match condition {
        ParamCondition::Flag(param) | ParamCondition::Present(param) => !param.is_empty(),
        ParamCondition::Equals { param, .. } => !param.is_empty(),
        ParamCondition::HasKey { param, key } => !param.is_empty() && !key.is_empty(),
        ParamCondition::Not(inner) => condition_is_valid(inner),
        ParamCondition::All(all) | ParamCondition::Any(all) => {
            !all.is_empty() && all.iter().all(condition_is_valid)
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with '-' or '_', starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    if !chars.next().is_some_and(|first| first.is_ascii_lowercase()) {
        return false;
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(yaml: &str) -> SuiteConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("basic"));
        assert!(is_valid_name("geo-redundant_isolation-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Basic"));
        assert!(!is_valid_name("1-basic"));
        assert!(!is_valid_name("naming/prod"));
    }

    #[test]
    fn test_valid_suite_has_warnings_only() {
        let result = ConfigValidator::new().check(&suite(
            r"
scenarios:
  - name: basic
    target: /nonexistent/module
    vars: { location: westeurope }
",
        ));
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 2);
    }

    #[test]
    fn test_collects_every_error() {
        let result = ConfigValidator::new().without_target_check().check(&suite(
            r#"
engine:
  parallelism: 0
retry:
  max_attempts: 0
  multiplier: 0.5
  retryable_errors: ["(unclosed"]
scenarios:
  - name: basic
    target: module
    assertions:
      - address_exists: ""
      - attribute_contains: { path: name, substring: prod }
  - name: basic
    target: module
    assertions:
      - conditional_inclusion: { address: a.b, when: { all: [] } }
"#,
        ));

        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "engine.parallelism",
                "retry.max_attempts",
                "retry.multiplier",
                "retry.retryable_errors[0]",
                "scenarios[0].assertions[0].address",
                "scenarios[0].assertions[1]",
                "scenarios[1].name",
                "scenarios[1].assertions[0].when",
            ]
        );
    }

    #[test]
    fn test_empty_suite_rejected() {
        let err = ConfigValidator::new().validate(&suite("scenarios: []\n")).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "scenarios"
        ));
    }
}
