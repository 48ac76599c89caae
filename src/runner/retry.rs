//! Retry of transient engine failures.
//!
//! Provider registries and plugin downloads fail intermittently. A
//! [`RetryPolicy`] re-runs an invocation when its diagnostic text matches a
//! known transient pattern, with capped exponential backoff between
//! attempts. Everything else fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{ConfigError, InvocationError};

/// Diagnostics that indicate a transient failure.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    r"(?s).*connection reset by peer.*",
    r"(?s).*transport is closing.*",
    r"(?s).*unable to verify (signature|checksum).*",
    r"(?s).*registry service is unreachable.*",
    r"(?s).*Failed to query available provider packages.*",
    r"(?s).*timeout while waiting for plugin to start.*",
    r"(?s).*timed out waiting for server handshake.*",
    r"(?s).*could not query provider registry.*",
    r"(?s).*Could not retrieve the list of available versions.*",
    r"(?s).*(Error installing|Failed to install) provider.*",
    r"(?s).*TLS handshake timeout.*",
    r"(?s).*unexpected EOF.*",
];

/// Retry policy for engine invocations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    retryable: Vec<Regex>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            retryable: Self::default_catalogue(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            retryable: Vec::new(),
            ..Self::default()
        }
    }

    /// Builds a policy from suite configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a retryable pattern is not a valid regex.
    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        let retryable = match &config.retryable_errors {
            None => Self::default_catalogue(),
            Some(patterns) => patterns
                .iter()
                .enumerate()
                .map(|(i, pattern)| {
                    Regex::new(pattern).map_err(|e| {
                        ConfigError::validation(
                            format!("Invalid regex '{pattern}': {e}"),
                            format!("retry.retryable_errors[{i}]"),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            retryable,
        })
    }

    /// Compiles [`DEFAULT_RETRYABLE_ERRORS`].
    #[must_use]
    pub fn default_catalogue() -> Vec<Regex> {
        DEFAULT_RETRYABLE_ERRORS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.multiplier = multiplier;
        self
    }

    /// Sets the total number of attempts (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Longest wait between two attempts.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns true if `err` is a transient engine failure.
    ///
    /// Only non-zero exits are candidates: spawn failures, timeouts and
    /// preparation errors repeat identically.
    #[must_use]
    pub fn is_retryable(&self, err: &InvocationError) -> bool {
        if !matches!(err, InvocationError::NonZeroExit { .. }) {
            return false;
        }
        let text = err.diagnostic_text();
        self.retryable.iter().any(|re| re.is_match(&text))
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        // NaN and infinity both fall back to the cap.
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_backoff
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, InvocationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvocationError>>,
    {
        self.run_with(label, |err| self.is_retryable(err), op).await
    }

    /// Like [`Self::run`] with a caller-supplied retry predicate.
    ///
    /// # Errors
    ///
    /// Returns the last error.
    pub async fn run_with<T, P, F, Fut>(
        &self,
        label: &str,
        is_retryable: P,
        mut op: F,
    ) -> Result<T, InvocationError>
    where
        P: Fn(&InvocationError) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvocationError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, self.max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
