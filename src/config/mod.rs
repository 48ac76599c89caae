//! Suite configuration module.
//!
//! This module handles all suite-related functionality:
//! - Parsing and deserializing `plan-harness.yaml`
//! - Validation of engine, retry and scenario settings
//! - Fingerprints of parameter sets and plans

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{DefaultsConfig, EngineConfig, RetryConfig, ScenarioConfig, SuiteConfig};
pub use parser::{ConfigParser, DEFAULT_SUITE_FILES, SUITE_ENV_VAR, find_config_file};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
