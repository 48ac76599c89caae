//! Scenario runner module.
//!
//! This module provides:
//! - Scenario definitions and their lifecycle phases
//! - Retry of transient engine failures
//! - Per-target locking so scenarios sharing a directory never overlap
//! - Concurrent execution with guaranteed teardown and per-scenario reports

mod lock;
mod report;
mod retry;
mod scenario;
mod suite;

pub use lock::{
    LOCK_EXPIRY_SECS, LOCK_FILE, LockInfo, STEPS_PER_SCENARIO, TargetLock, TargetLocks,
    generate_holder_id, lock_expiry,
};
pub use report::{ScenarioOutcome, ScenarioReport, SuiteReport};
pub use retry::{DEFAULT_RETRYABLE_ERRORS, RetryPolicy};
pub use scenario::{Scenario, ScenarioPhase};
pub use suite::{DEFAULT_PARALLELISM, ScenarioRunner};
