//! Assertion outcomes.

use std::fmt;

use serde::Serialize;

/// Category of an assertion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No record has the address.
    MissingAddress,
    /// A record exists with an action other than no-op.
    UnexpectedPresence,
    /// The record has no "after" snapshot.
    MissingSnapshot,
    /// The attribute path does not resolve.
    AttributeMissing,
    /// The attribute resolved to a non string-like value.
    NotStringLike,
    /// The attribute does not contain the expected substring.
    SubstringMissing,
    /// The record's action differs from the expected one.
    ActionMismatch,
    /// Number of records differs from the expected count.
    CountMismatch,
    /// Address absent from the planned-values tree.
    MissingPlannedValue,
}

/// A failed assertion with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Short label of the assertion that failed.
    pub assertion: String,
    /// Mismatch explanation.
    pub message: String,
}

/// Result of one predicate.
pub type Check = Result<(), AssertionFailure>;

/// Results of evaluating a list of assertions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssertionReport {
    /// Number of assertions evaluated.
    pub evaluated: usize,
    /// Number of assertions not evaluated because of fail-fast.
    pub skipped: usize,
    /// Collected failures.
    pub failures: Vec<AssertionFailure>,
}

impl AssertionFailure {
    /// Creates a failure.
    #[must_use]
    pub fn new(kind: FailureKind, assertion: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            assertion: assertion.into(),
            message: message.into(),
        }
    }

    /// Replaces the assertion label, keeping kind and message.
    #[must_use]
    pub fn relabel(mut self, assertion: impl Into<String>) -> Self {
        self.assertion = assertion.into();
        self
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.assertion, self.message)
    }
}

impl AssertionReport {
    /// Returns true if no assertion failed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failure messages, one per failed assertion.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }
}
