//! Planning engine trait definition.
//!
//! This module defines the command contract the harness needs from an
//! external planning engine. Every step runs inside the target directory.

use std::path::Path;

use async_trait::async_trait;

use crate::error::InvocationError;

/// Trait for planning engine backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanEngine: Send + Sync {
    /// Initializes the target (providers, modules, backend).
    async fn init(&self, workdir: &Path) -> Result<(), InvocationError>;

    /// Computes a plan without applying it and saves it to `plan_file`.
    async fn plan(&self, workdir: &Path, var_file: &Path, plan_file: &Path) -> Result<(), InvocationError>;

    /// Renders a saved plan as a JSON document.
    async fn show(&self, workdir: &Path, plan_file: &Path) -> Result<String, InvocationError>;

    /// Applies a saved plan.
    async fn apply(&self, workdir: &Path, plan_file: &Path) -> Result<(), InvocationError>;

    /// Destroys everything the target manages.
    async fn destroy(&self, workdir: &Path, var_file: &Path) -> Result<(), InvocationError>;
}
