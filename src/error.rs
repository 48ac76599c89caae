//! Error types for the plan harness.
//!
//! This module provides the error hierarchy for every stage of a scenario:
//! suite configuration, parameter construction, engine invocation, plan
//! parsing, and target-path locking. Assertion failures are not errors; they
//! are collected values (see [`crate::assertions::AssertionFailure`]).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the plan harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Suite configuration or parameter-set errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Planning engine invocation errors.
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    /// Plan document parse errors.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Target-path lock errors.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Suite configuration and parameter-set errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The suite file was not found.
    #[error("Suite file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The suite file could not be parsed.
    #[error("Failed to parse suite: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Suite validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A key appeared twice in the same parameter mapping.
    #[error("Duplicate key '{key}' in {context}")]
    DuplicateKey {
        /// The duplicated key.
        key: String,
        /// Where the duplicate was found.
        context: String,
    },

    /// A parameter or mapping key was empty.
    #[error("Empty key in {context}")]
    EmptyKey {
        /// Where the empty key was found.
        context: String,
    },

    /// A parameter value cannot be represented.
    #[error("Unsupported parameter value for '{name}': {reason}")]
    UnsupportedValue {
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Planning engine invocation errors.
///
/// The harness never interprets engine-internal causes; `stderr` carries the
/// engine's raw diagnostic text.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The engine process could not be started.
    #[error("Failed to start '{program}': {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// OS error text.
        message: String,
    },

    /// The engine exited with a non-zero status.
    #[error("'{step}' exited with status {code:?}: {stderr}")]
    NonZeroExit {
        /// Engine step (`init`, `plan`, ...).
        step: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Raw standard error.
        stderr: String,
    },

    /// The engine did not finish before its deadline.
    #[error("'{step}' timed out after {timeout:?}")]
    Timeout {
        /// Engine step.
        step: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// The engine produced output the harness cannot read.
    #[error("'{step}' produced malformed output: {message}")]
    MalformedOutput {
        /// Engine step.
        step: String,
        /// Description of the problem.
        message: String,
    },

    /// Rendering the invocation context (var file, work dir) failed.
    #[error("Failed to prepare invocation in {path}: {message}")]
    Prepare {
        /// Directory being prepared.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Plan document parse errors.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not valid JSON.
    #[error("Plan document is not valid JSON: {message}")]
    InvalidJson {
        /// Decoder message.
        message: String,
    },

    /// A required envelope field is missing or has the wrong shape.
    #[error("Plan document is missing required field '{field}'")]
    MissingField {
        /// Dotted path of the missing field.
        field: String,
    },

    /// A resource change entry is malformed.
    #[error("Resource change #{index} is malformed: {message}")]
    InvalidEntry {
        /// Position in `resource_changes`.
        index: usize,
        /// Description of the problem.
        message: String,
    },

    /// Two resource change entries share an address.
    #[error("Duplicate resource address in plan: {address}")]
    DuplicateAddress {
        /// The repeated address.
        address: String,
    },
}

/// Target-path lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// The target is locked by another process.
    #[error("Target {path} is locked by {holder} (since {since})")]
    LockedByOther {
        /// Locked target directory.
        path: PathBuf,
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// The lock file could not be read or written.
    #[error("Failed to manage lock file {path}: {message}")]
    LockFile {
        /// Lock file path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl InvocationError {
    /// Returns the text that retry predicates match against.
    #[must_use]
    pub fn diagnostic_text(&self) -> String {
        match self {
            Self::NonZeroExit { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the engine step this error belongs to, if any.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { step, .. }
            | Self::Timeout { step, .. }
            | Self::MalformedOutput { step, .. } => Some(step.as_str()),
            Self::Spawn { .. } | Self::Prepare { .. } => None,
        }
    }
}

impl ParseError {
    /// Creates a missing-field error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid-entry error.
    #[must_use]
    pub fn entry(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            index,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_text_prefers_stderr() {
        let err = InvocationError::NonZeroExit {
            step: String::from("plan"),
            code: Some(1),
            stderr: String::from("Error: connection reset by peer"),
        };
        assert_eq!(err.diagnostic_text(), "Error: connection reset by peer");
        assert_eq!(err.step(), Some("plan"));
    }

    #[test]
    fn test_timeout_message_names_step() {
        let err = InvocationError::Timeout {
            step: String::from("init"),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("'init' timed out"));
    }
}
