//! Command-line planning engine.
//!
//! Runs a Terraform-compatible binary (`terraform`, `tofu`) as a child
//! process. Every step has a deadline; a child that outlives it is killed
//! and the step fails with [`InvocationError::Timeout`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::InvocationError;

use super::backend::PlanEngine;

/// Default deadline for one engine step in seconds.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 900;

/// Engine backed by a Terraform-compatible CLI.
#[derive(Debug, Clone)]
pub struct CliEngine {
    /// Program to execute.
    program: String,
    /// Arguments placed before every subcommand.
    leading_args: Vec<String>,
    /// Extra environment for every step.
    env: BTreeMap<String, String>,
    /// Deadline for each step.
    step_timeout: Duration,
}

impl CliEngine {
    /// Creates an engine running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            env: BTreeMap::new(),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
        }
    }

    /// Creates an engine from the suite's engine section.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut engine = Self::new(&config.binary)
            .with_leading_args(config.args.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs));
        for (key, value) in &config.env {
            engine = engine.with_env(key, value);
        }
        if config.plugin_cache {
            engine = engine.with_plugin_cache();
        }
        engine
    }

    /// Sets arguments placed before every subcommand.
    #[must_use]
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    /// Adds an environment variable for every step.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the per-step deadline.
    #[must_use]
    pub const fn with_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Shares provider plugins across targets through the user cache dir.
    #[must_use]
    pub fn with_plugin_cache(self) -> Self {
        let Some(dir) = plugin_cache_dir() else {
            warn!("No user cache directory; provider plugin cache disabled");
            return self;
        };
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Cannot create plugin cache {}: {}", dir.display(), e);
            return self;
        }
        self.with_env("TF_PLUGIN_CACHE_DIR", dir.to_string_lossy())
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the per-step deadline.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Runs one step and returns its standard output.
    async fn run(&self, workdir: &Path, step: &str, args: &[String]) -> Result<String, InvocationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .arg(step)
            .args(args)
            .current_dir(workdir)
            .envs(&self.env)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Running {} {} {} in {}",
            self.program,
            step,
            args.join(" "),
            workdir.display()
        );

        let child = command.spawn().map_err(|e| InvocationError::Spawn {
            program: self.program.clone(),
            message: e.to_string(),
        })?;

        // Dropping the wait future on expiry drops the child, which kills it.
        let output = timeout(self.step_timeout, child.wait_with_output())
            .await
            .map_err(|_| InvocationError::Timeout {
                step: step.to_string(),
                timeout: self.step_timeout,
            })?
            .map_err(|e| InvocationError::MalformedOutput {
                step: step.to_string(),
                message: format!("failed to collect output: {e}"),
            })?;

        let stdout = String::from_utf8(output.stdout).map_err(|e| InvocationError::MalformedOutput {
            step: step.to_string(),
            message: format!("stdout is not UTF-8: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(InvocationError::NonZeroExit {
                step: step.to_string(),
                code: output.status.code(),
                stderr: if stderr.is_empty() { stdout.trim().to_string() } else { stderr },
            });
        }

        Ok(stdout)
    }
}

#[async_trait]
impl PlanEngine for CliEngine {
    async fn init(&self, workdir: &Path) -> Result<(), InvocationError> {
        self.run(workdir, "init", &[flag("-input=false"), flag("-no-color")])
            .await
            .map(drop)
    }

    async fn plan(&self, workdir: &Path, var_file: &Path, plan_file: &Path) -> Result<(), InvocationError> {
        let args = [
            flag("-input=false"),
            flag("-lock=false"),
            flag("-no-color"),
            format!("-var-file={}", var_file.display()),
            format!("-out={}", plan_file.display()),
        ];
        self.run(workdir, "plan", &args).await.map(drop)
    }

    async fn show(&self, workdir: &Path, plan_file: &Path) -> Result<String, InvocationError> {
        let args = [flag("-json"), flag("-no-color"), plan_file.display().to_string()];
        self.run(workdir, "show", &args).await
    }

    async fn apply(&self, workdir: &Path, plan_file: &Path) -> Result<(), InvocationError> {
        let args = [
            flag("-input=false"),
            flag("-auto-approve"),
            flag("-no-color"),
            plan_file.display().to_string(),
        ];
        self.run(workdir, "apply", &args).await.map(drop)
    }

    async fn destroy(&self, workdir: &Path, var_file: &Path) -> Result<(), InvocationError> {
        let args = [
            flag("-input=false"),
            flag("-auto-approve"),
            flag("-no-color"),
            format!("-var-file={}", var_file.display()),
        ];
        self.run(workdir, "destroy", &args).await.map(drop)
    }
}

fn flag(text: &str) -> String {
    text.to_string()
}

/// Location of the shared provider plugin cache.
#[must_use]
pub fn plugin_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("plan-harness").join("plugin-cache"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::{ExecutionMode, PlanInvoker, Workspace};
    use crate::params::ParameterSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Writes a shell script standing in for the engine and returns an
    /// engine that runs it through `/bin/sh`.
    fn script_engine(dir: &TempDir, body: &str) -> CliEngine {
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, body).unwrap();
        CliEngine::new("/bin/sh").with_leading_args(vec![script.display().to_string()])
    }

    const FAKE_ENGINE: &str = r#"
step="$1"; shift
echo "$step $*" >> calls.log
case "$step" in
  plan)
    for arg in "$@"; do
      case "$arg" in -out=*) : > "${arg#-out=}" ;; esac
    done
    ;;
  show) printf '{"format_version":"1.2","resource_changes":[]}' ;;
esac
"#;

    #[tokio::test]
    async fn test_steps_run_in_workdir() {
        let dir = TempDir::new().unwrap();
        let engine = script_engine(&dir, FAKE_ENGINE);
        let plan_file = dir.path().join("scenario.tfplan");
        let var_file = dir.path().join("scenario.tfvars.json");

        engine.init(dir.path()).await.unwrap();
        engine.plan(dir.path(), &var_file, &plan_file).await.unwrap();
        let document = engine.show(dir.path(), &plan_file).await.unwrap();

        assert!(plan_file.exists());
        assert!(document.contains("format_version"));
        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let steps: Vec<&str> = calls.lines().filter_map(|l| l.split(' ').next()).collect();
        assert_eq!(steps, vec!["init", "plan", "show"]);
        assert!(calls.contains("-lock=false"));
        assert!(calls.contains(&format!("-var-file={}", var_file.display())));
    }

    const VAR_FILE_CHECK: &str = r#"
step="$1"; shift
case "$step" in
  plan)
    for arg in "$@"; do
      case "$arg" in
        -var-file=*) [ -f "${arg#-var-file=}" ] || { echo "var file not found: ${arg#-var-file=}" >&2; exit 3; } ;;
        -out=*) : > "${arg#-out=}" ;;
      esac
    done
    ;;
  show)
    for plan_file; do :; done
    [ -f "$plan_file" ] || { echo "plan file not found: $plan_file" >&2; exit 3; }
    printf '{"format_version":"1.2","resource_changes":[]}'
    ;;
esac
"#;

    #[tokio::test]
    async fn test_relative_target_paths_resolve_inside_workdir() {
        let dir = TempDir::new_in(".").unwrap();
        let relative = Path::new(".").join(dir.path().file_name().unwrap());
        let engine = script_engine(&dir, VAR_FILE_CHECK);
        let workspace = Workspace::new(&relative, "basic");
        let params = ParameterSet::builder().value("location", "westeurope").build().unwrap();

        let invoker = PlanInvoker::new(Arc::new(engine));
        let result = invoker.invoke(&workspace, &params, ExecutionMode::PlanOnly).await.unwrap();

        assert!(result.document.contains("format_version"));
        assert!(workspace.var_file().is_absolute());
        assert!(workspace.var_file().exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let engine = script_engine(&dir, "echo 'Error: Invalid value for variable' >&2\nexit 1\n");

        let err = engine.init(dir.path()).await.unwrap_err();
        match err {
            InvocationError::NonZeroExit { step, code, stderr } => {
                assert_eq!(step, "init");
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "Error: Invalid value for variable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_step_deadline_kills_child() {
        let dir = TempDir::new().unwrap();
        let engine = script_engine(&dir, "sleep 5\n").with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = engine.init(dir.path()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { ref step, .. } if step == "init"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let engine = CliEngine::new("/nonexistent/plan-harness-engine");
        let err = engine.init(dir.path()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Spawn { .. }));
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            binary: String::from("tofu"),
            timeout_secs: 30,
            plugin_cache: false,
            env: BTreeMap::from([(String::from("ARM_SKIP_PROVIDER_REGISTRATION"), String::from("true"))]),
            ..EngineConfig::default()
        };
        let engine = CliEngine::from_config(&config);
        assert_eq!(engine.program(), "tofu");
        assert_eq!(engine.step_timeout(), Duration::from_secs(30));
        assert_eq!(engine.env.get("ARM_SKIP_PROVIDER_REGISTRATION").map(String::as_str), Some("true"));
    }
}
