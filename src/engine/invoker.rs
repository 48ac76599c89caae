//! Plan invoker.
//!
//! Renders a parameter set into the target's harness work directory and
//! drives the engine through `init`, `plan` and `show` (plus `apply` in
//! plan-and-apply mode). The invoker never retries; see
//! [`RetryPolicy`](crate::runner::RetryPolicy).

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::config::ConfigHasher;
use crate::error::InvocationError;
use crate::params::ParameterSet;

use super::backend::PlanEngine;

/// Harness work directory inside each target.
pub const WORK_DIR: &str = ".plan-harness";

/// Whether a scenario only plans or also applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Dry-run only.
    #[default]
    PlanOnly,
    /// Plan, then apply the saved plan.
    PlanAndApply,
}

impl ExecutionMode {
    /// Returns true if the mode applies the plan.
    #[must_use]
    pub const fn applies(self) -> bool {
        matches!(self, Self::PlanAndApply)
    }

    /// Returns the mode as text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlanOnly => "plan_only",
            Self::PlanAndApply => "plan_and_apply",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Files one scenario owns inside a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    target: PathBuf,
    dir: PathBuf,
    var_file: PathBuf,
    plan_file: PathBuf,
}

impl Workspace {
    /// Creates the workspace layout for a scenario.
    ///
    /// A relative target is anchored to the current directory: engine steps
    /// run inside the target, so the paths passed to them must be absolute.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>, scenario: &str) -> Self {
        let target = target.into();
        let target = std::path::absolute(&target).unwrap_or(target);
        let dir = target.join(WORK_DIR);
        Self {
            var_file: dir.join(format!("{scenario}.tfvars.json")),
            plan_file: dir.join(format!("{scenario}.tfplan")),
            target,
            dir,
        }
    }

    /// Target configuration directory.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Harness work directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rendered variables file.
    #[must_use]
    pub fn var_file(&self) -> &Path {
        &self.var_file
    }

    /// Saved plan file.
    #[must_use]
    pub fn plan_file(&self) -> &Path {
        &self.plan_file
    }

    /// Writes the parameter set as the engine's JSON variables file.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is missing or the file cannot be written.
    pub async fn prepare(&self, params: &ParameterSet) -> Result<(), InvocationError> {
        let prepare_err = |message: String| InvocationError::Prepare {
            path: self.target.clone(),
            message,
        };

        if !fs::try_exists(&self.target).await.unwrap_or(false) {
            return Err(prepare_err(String::from("target directory does not exist")));
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| prepare_err(format!("cannot create {}: {e}", self.dir.display())))?;

        let content = serde_json::to_string_pretty(&params.to_json())
            .map_err(|e| prepare_err(format!("cannot render variables: {e}")))?;
        fs::write(&self.var_file, content)
            .await
            .map_err(|e| prepare_err(format!("cannot write {}: {e}", self.var_file.display())))?;

        debug!("Rendered {} parameters to {}", params.len(), self.var_file.display());
        Ok(())
    }

    /// Removes the scenario's files, and the work directory once empty.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error other than a missing file.
    pub async fn cleanup(&self) -> std::io::Result<()> {
        for file in [&self.var_file, &self.plan_file] {
            match fs::remove_file(file).await {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        // Another scenario may still own files here; a non-empty dir is fine.
        if fs::remove_dir(&self.dir).await.is_err() {
            debug!("Leaving {} in place", self.dir.display());
        }
        Ok(())
    }
}

/// Output of a successful invocation.
#[derive(Debug, Clone)]
pub struct PlanResult {
    /// Raw plan document (`show -json` output).
    pub document: String,
    /// Whether the plan was applied.
    pub applied: bool,
    /// Fingerprint of the rendered parameter set.
    pub params_hash: String,
}

/// Drives a [`PlanEngine`] for one invocation.
#[derive(Clone)]
pub struct PlanInvoker {
    engine: Arc<dyn PlanEngine>,
}

impl fmt::Debug for PlanInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanInvoker").finish_non_exhaustive()
    }
}

impl PlanInvoker {
    /// Creates an invoker.
    #[must_use]
    pub fn new(engine: Arc<dyn PlanEngine>) -> Self {
        Self { engine }
    }

    /// Renders `params` into the workspace and runs the engine.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. An error whose step is `apply` means
    /// the engine may have created state.
    pub async fn invoke(
        &self,
        workspace: &Workspace,
        params: &ParameterSet,
        mode: ExecutionMode,
    ) -> Result<PlanResult, InvocationError> {
        let hasher = ConfigHasher::new();
        let params_hash = hasher.hash_parameters(params);
        info!(
            "Planning {} ({}, parameters {})",
            workspace.target().display(),
            mode,
            hasher.short_hash(&params_hash)
        );

        workspace.prepare(params).await?;

        let target = workspace.target();
        self.engine.init(target).await?;
        self.engine
            .plan(target, workspace.var_file(), workspace.plan_file())
            .await?;
        let document = self.engine.show(target, workspace.plan_file()).await?;

        if document.trim().is_empty() {
            return Err(InvocationError::MalformedOutput {
                step: String::from("show"),
                message: String::from("empty plan document"),
            });
        }

        if mode.applies() {
            self.engine.apply(target, workspace.plan_file()).await?;
            info!("Applied plan for {}", target.display());
        }

        Ok(PlanResult {
            document,
            applied: mode.applies(),
            params_hash,
        })
    }

    /// Runs the engine's destroy step for the workspace.
    ///
    /// # Errors
    ///
    /// Returns the engine error; callers treat it as a warning.
    pub async fn destroy(&self, workspace: &Workspace) -> Result<(), InvocationError> {
        self.engine
            .destroy(workspace.target(), workspace.var_file())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::MockPlanEngine;
    use mockall::Sequence;
    use tempfile::TempDir;

    const EMPTY_PLAN: &str = r#"{"format_version":"1.2"}"#;

    fn params() -> ParameterSet {
        ParameterSet::builder()
            .value("resource_group_name", "rg-test")
            .value("location", "westeurope")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plan_only_runs_init_plan_show_in_order() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path(), "basic");
        let mut engine = MockPlanEngine::new();
        let mut seq = Sequence::new();

        engine.expect_init().times(1).in_sequence(&mut seq).returning(|_| Ok(()));
        let expected_var_file = workspace.var_file().to_path_buf();
        engine
            .expect_plan()
            .withf(move |_, var_file, _| var_file == expected_var_file.as_path())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        engine
            .expect_show()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(EMPTY_PLAN.to_string()));
        engine.expect_apply().never();

        let invoker = PlanInvoker::new(Arc::new(engine));
        let result = invoker.invoke(&workspace, &params(), ExecutionMode::PlanOnly).await.unwrap();

        assert!(!result.applied);
        assert_eq!(result.document, EMPTY_PLAN);
        let rendered: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(workspace.var_file()).unwrap()).unwrap();
        assert_eq!(rendered["location"], "westeurope");
    }

    #[tokio::test]
    async fn test_plan_failure_short_circuits() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path(), "broken");
        let mut engine = MockPlanEngine::new();

        engine.expect_init().returning(|_| Ok(()));
        engine.expect_plan().returning(|_, _, _| {
            Err(InvocationError::NonZeroExit {
                step: String::from("plan"),
                code: Some(1),
                stderr: String::from("Error: Missing required argument"),
            })
        });
        engine.expect_show().never();

        let invoker = PlanInvoker::new(Arc::new(engine));
        let err = invoker.invoke(&workspace, &params(), ExecutionMode::PlanOnly).await.unwrap_err();
        assert_eq!(err.step(), Some("plan"));
        assert!(err.diagnostic_text().contains("Missing required argument"));
    }

    #[tokio::test]
    async fn test_plan_and_apply_applies_saved_plan() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path(), "applied");
        let mut engine = MockPlanEngine::new();

        engine.expect_init().returning(|_| Ok(()));
        engine.expect_plan().returning(|_, _, _| Ok(()));
        engine.expect_show().returning(|_, _| Ok(EMPTY_PLAN.to_string()));
        let expected_plan = workspace.plan_file().to_path_buf();
        engine
            .expect_apply()
            .withf(move |_, plan_file| plan_file == expected_plan.as_path())
            .times(1)
            .returning(|_, _| Ok(()));

        let invoker = PlanInvoker::new(Arc::new(engine));
        let result = invoker.invoke(&workspace, &params(), ExecutionMode::PlanAndApply).await.unwrap();
        assert!(result.applied);
    }

    #[tokio::test]
    async fn test_missing_target_fails_before_engine() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path().join("missing"), "basic");
        let mut engine = MockPlanEngine::new();
        engine.expect_init().never();

        let invoker = PlanInvoker::new(Arc::new(engine));
        let err = invoker.invoke(&workspace, &params(), ExecutionMode::PlanOnly).await.unwrap_err();
        assert!(matches!(err, InvocationError::Prepare { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_removes_files_and_empty_dir() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path(), "basic");
        workspace.prepare(&params()).await.unwrap();
        std::fs::write(workspace.plan_file(), b"plan").unwrap();

        workspace.cleanup().await.unwrap();
        assert!(!workspace.dir().exists());
        // Idempotent.
        workspace.cleanup().await.unwrap();
    }
}
