//! Plan invoker module.
//!
//! This module provides:
//! - The [`PlanEngine`] command contract
//! - A CLI-backed engine with per-step deadlines
//! - The [`PlanInvoker`] that renders parameters and drives one invocation

mod backend;
mod cli;
mod invoker;

pub use backend::PlanEngine;
#[cfg(test)]
pub use backend::MockPlanEngine;
pub use cli::{CliEngine, DEFAULT_STEP_TIMEOUT_SECS, plugin_cache_dir};
pub use invoker::{ExecutionMode, PlanInvoker, PlanResult, WORK_DIR, Workspace};
