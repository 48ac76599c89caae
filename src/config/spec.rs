//! Suite specification types.
//!
//! This module defines the structs that map to the `plan-harness.yaml` file.
//! A suite names the planning engine, the retry policy and the scenarios to
//! run against one or more target configurations.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::assertions::Assertion;
use crate::engine::{DEFAULT_STEP_TIMEOUT_SECS, ExecutionMode};

/// The root structure of a suite file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Planning engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Retry policy for transient engine errors.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Scenario defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Scenarios, in declaration order.
    pub scenarios: Vec<ScenarioConfig>,
}

/// Planning engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine binary (`terraform`, `tofu`, or a path).
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before every subcommand.
    #[serde(default)]
    pub args: Vec<String>,
    /// Deadline for each engine step, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of scenarios running at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Share provider plugins across targets.
    #[serde(default = "default_plugin_cache")]
    pub plugin_cache: bool,
    /// Extra environment for every engine step.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Retry policy for transient engine errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Regexes matched against engine diagnostics. `None` uses the built-in
    /// catalogue; an empty list disables retries.
    #[serde(default)]
    pub retryable_errors: Option<Vec<String>>,
}

/// Defaults applied to every scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Execution mode.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Stop evaluating a scenario's assertions at the first failure.
    #[serde(default)]
    pub fail_fast: bool,
}

/// One scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Unique scenario name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Target configuration directory, relative to the suite file.
    pub target: PathBuf,
    /// Input variables.
    #[serde(default)]
    pub vars: serde_yaml::Mapping,
    /// Execution mode; defaults to `defaults.mode`.
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    /// Stop at the first failed assertion; defaults to `defaults.fail_fast`.
    #[serde(default)]
    pub fail_fast: Option<bool>,
    /// Plan a second time and require identical actions.
    #[serde(default)]
    pub verify_idempotent: bool,
    /// Assertions evaluated against the plan.
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            parallelism: default_parallelism(),
            plugin_cache: default_plugin_cache(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            retryable_errors: None,
        }
    }
}

impl ScenarioConfig {
    /// Effective execution mode.
    #[must_use]
    pub fn effective_mode(&self, defaults: &DefaultsConfig) -> ExecutionMode {
        self.mode.unwrap_or(defaults.mode)
    }

    /// Effective fail-fast flag.
    #[must_use]
    pub fn effective_fail_fast(&self, defaults: &DefaultsConfig) -> bool {
        self.fail_fast.unwrap_or(defaults.fail_fast)
    }
}

impl SuiteConfig {
    /// Finds a scenario by name.
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Scenarios whose name contains `filter` (all when `None`).
    pub fn filtered<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a ScenarioConfig> {
        self.scenarios
            .iter()
            .filter(move |s| filter.is_none_or(|f| s.name.contains(f)))
    }
}

// Default value functions

fn default_binary() -> String {
    String::from("terraform")
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

const fn default_parallelism() -> usize {
    4
}

const fn default_plugin_cache() -> bool {
    true
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2_000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}
