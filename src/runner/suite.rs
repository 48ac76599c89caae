//! Scenario runner.
//!
//! Runs each scenario through the lifecycle
//! `Built -> Planned -> Asserted -> TornDown` as its own task. Scenarios on
//! different targets run concurrently up to the configured parallelism;
//! scenarios sharing a target are serialized through [`TargetLocks`]. A
//! scenario takes its parallelism permit only once it holds its target, so
//! scenarios queued on a busy target do not block other targets.
//! Teardown runs exactly once per scenario, whichever phase failed or
//! panicked.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::assertions::evaluate;
use crate::config::ConfigHasher;
use crate::engine::{ExecutionMode, PlanEngine, PlanInvoker, PlanResult, Workspace};
use crate::error::InvocationError;
use crate::plan::{PlanGraph, PlanParser};

use super::lock::{TargetLock, TargetLocks};
use super::report::{ScenarioOutcome, ScenarioReport, SuiteReport};
use super::retry::RetryPolicy;
use super::scenario::{Scenario, ScenarioPhase};

/// Default number of concurrent scenarios.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Runs scenarios against a planning engine.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    invoker: PlanInvoker,
    retry: RetryPolicy,
    locks: Arc<TargetLocks>,
    parallelism: usize,
    fail_fast: bool,
    keep_artifacts: bool,
}

impl ScenarioRunner {
    /// Creates a runner with the default retry policy.
    #[must_use]
    pub fn new(engine: Arc<dyn PlanEngine>) -> Self {
        Self {
            invoker: PlanInvoker::new(engine),
            retry: RetryPolicy::default(),
            locks: Arc::new(TargetLocks::new()),
            parallelism: DEFAULT_PARALLELISM,
            fail_fast: false,
            keep_artifacts: false,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum number of concurrent scenarios (at least one).
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Forces fail-fast assertion evaluation for every scenario.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Leaves rendered variables and saved plans in place after teardown.
    #[must_use]
    pub const fn keep_artifacts(mut self, keep: bool) -> Self {
        self.keep_artifacts = keep;
        self
    }

    /// Shares a lock registry with other runners.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<TargetLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Runs every scenario and returns their reports in declaration order.
    ///
    /// A panicking scenario is reported as failed; the others are
    /// unaffected.
    pub async fn run_all(&self, scenarios: Vec<Scenario>) -> SuiteReport {
        let started = Instant::now();
        info!(
            "Running {} scenarios (parallelism {})",
            scenarios.len(),
            self.parallelism
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let runner = Arc::new(self.clone());
        let mut handles = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let stub = ScenarioReport::new(&scenario);
            let semaphore = Arc::clone(&semaphore);
            let runner = Arc::clone(&runner);

            let handle = tokio::spawn(async move {
                let span = info_span!("scenario", scenario = %scenario.name());
                runner
                    .run_scenario_inner(&scenario, Some(semaphore))
                    .instrument(span)
                    .await
            });
            handles.push((stub, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (stub, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Scenario {} aborted: {}", stub.name, e);
                    let message = if e.is_panic() {
                        format!("scenario panicked: {}", panic_message(&*e.into_panic()))
                    } else {
                        format!("scenario task failed: {e}")
                    };
                    reports.push(stub.panicked(message));
                }
            }
        }

        let report = SuiteReport {
            scenarios: reports,
            duration_ms: elapsed_ms(started),
        };
        info!(
            "Suite finished: {} passed, {} failed in {}ms",
            report.passed_count(),
            report.failed_count(),
            report.duration_ms
        );
        report
    }

    /// Runs one scenario to completion, including teardown.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let span = info_span!("scenario", scenario = %scenario.name());
        self.run_scenario_inner(scenario, None).instrument(span).await
    }

    async fn run_scenario_inner(
        &self,
        scenario: &Scenario,
        permits: Option<Arc<Semaphore>>,
    ) -> ScenarioReport {
        let started = Instant::now();
        let mut report = ScenarioReport::new(scenario);
        let workspace = Workspace::new(scenario.target(), scenario.name());
        let applied = Arc::new(AtomicBool::new(false));

        info!("Starting scenario ({}, {})", scenario.target().display(), scenario.mode());

        let lock = match self.locks.acquire(scenario.target(), scenario.name()).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                error!("Cannot lock target: {}", e);
                report.fail(
                    ScenarioOutcome::InvocationFailed,
                    ScenarioPhase::InvocationFailed,
                    e.to_string(),
                );
                None
            }
        };

        let _permit = match (&lock, permits) {
            (Some(_), Some(permits)) => permits.acquire_owned().await.ok(),
            _ => None,
        };
        if lock.is_some() {
            report = self.execute_isolated(scenario, &workspace, &applied, report).await;
        }

        self.teardown(&workspace, applied.load(Ordering::SeqCst), lock, &mut report)
            .await;

        report.duration_ms = elapsed_ms(started);
        if report.passed() {
            info!("Scenario passed in {}ms", report.duration_ms);
        } else {
            warn!(
                "Scenario {} in {}ms",
                report.outcome.as_str(),
                report.duration_ms
            );
        }
        report
    }

    /// Runs [`Self::execute`] as its own task so a panic anywhere in the
    /// engine, invoker or parser still leaves the caller free to tear down.
    async fn execute_isolated(
        &self,
        scenario: &Scenario,
        workspace: &Workspace,
        applied: &Arc<AtomicBool>,
        report: ScenarioReport,
    ) -> ScenarioReport {
        let fallback = report.clone();
        let runner = self.clone();
        let scenario = scenario.clone();
        let workspace = workspace.clone();
        let applied = Arc::clone(applied);

        let handle = tokio::spawn(
            async move {
                let mut report = report;
                runner.execute(&scenario, &workspace, &applied, &mut report).await;
                report
            }
            .instrument(Span::current()),
        );

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                let message = if e.is_panic() {
                    format!("scenario panicked: {}", panic_message(&*e.into_panic()))
                } else {
                    format!("scenario task failed: {e}")
                };
                error!("{}", message);
                fallback.panicked(message)
            }
        }
    }

    /// Plans, parses and asserts. Failures are recorded in `report`.
    async fn execute(
        &self,
        scenario: &Scenario,
        workspace: &Workspace,
        applied: &AtomicBool,
        report: &mut ScenarioReport,
    ) {
        let result = match self
            .invoke(scenario, workspace, scenario.mode(), applied, report)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Invocation failed: {}", e);
                report.fail(
                    ScenarioOutcome::InvocationFailed,
                    ScenarioPhase::InvocationFailed,
                    e.to_string(),
                );
                return;
            }
        };
        report.advance(ScenarioPhase::Planned);

        let graph = match PlanParser::new().parse(&result.document) {
            Ok(graph) => graph,
            Err(e) => {
                error!("Plan parse failed: {}", e);
                report.fail(ScenarioOutcome::ParseFailed, ScenarioPhase::ParseFailed, e.to_string());
                return;
            }
        };
        report.action_counts = graph.action_counts();

        let fail_fast = self.fail_fast || scenario.fail_fast();
        let evaluated = catch_unwind(AssertUnwindSafe(|| {
            evaluate(scenario.assertions(), &graph, scenario.params(), fail_fast)
        }));
        match evaluated {
            Ok(assertions) => {
                debug!(
                    "Evaluated {} assertions, {} failed",
                    assertions.evaluated,
                    assertions.failures.len()
                );
                report.record_assertions(assertions);
            }
            Err(payload) => {
                report.add_failure(format!(
                    "assertion evaluation panicked: {}",
                    panic_message(&*payload)
                ));
            }
        }
        report.advance(ScenarioPhase::Asserted);

        if scenario.verify_idempotent() && !(fail_fast && !report.failures.is_empty()) {
            self.check_idempotence(scenario, workspace, &graph, applied, report)
                .await;
        }
    }

    /// Invokes the engine under the retry policy.
    async fn invoke(
        &self,
        scenario: &Scenario,
        workspace: &Workspace,
        mode: ExecutionMode,
        applied: &AtomicBool,
        report: &mut ScenarioReport,
    ) -> Result<PlanResult, InvocationError> {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let invoker = &self.invoker;
        let params = scenario.params();

        let result = self
            .retry
            .run("invocation", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                let result = invoker.invoke(workspace, params, mode).await;
                let touched = result
                    .as_ref()
                    .map_or_else(|e| e.step() == Some("apply"), |r| r.applied);
                if touched {
                    applied.store(true, Ordering::SeqCst);
                }
                result
            })
            .await;

        report.attempts += counter.load(Ordering::SeqCst);
        result
    }

    /// Plans a second time and compares with the first plan.
    ///
    /// Plan-only scenarios must produce the same actions; applied scenarios
    /// must produce an empty (all no-op) plan.
    async fn check_idempotence(
        &self,
        scenario: &Scenario,
        workspace: &Workspace,
        first: &PlanGraph,
        applied: &AtomicBool,
        report: &mut ScenarioReport,
    ) {
        info!("Re-planning to check idempotence");

        let second = match self
            .invoke(scenario, workspace, ExecutionMode::PlanOnly, applied, report)
            .await
        {
            Ok(result) => PlanParser::new().parse(&result.document).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let second = match second {
            Ok(graph) => graph,
            Err(e) => {
                report.add_failure(format!("idempotence check could not re-plan: {e}"));
                return;
            }
        };

        if scenario.mode().applies() {
            for change in second.iter().filter(|c| !c.action.is_noop()) {
                report.add_failure(format!(
                    "plan not empty after apply: {} would {}",
                    change.address, change.action
                ));
            }
            return;
        }

        let hasher = ConfigHasher::new();
        let before = hasher.hash_actions(first);
        let after = hasher.hash_actions(&second);
        if before == after {
            debug!("Plan fingerprint stable: {}", hasher.short_hash(&before));
            return;
        }
        for drift in action_drift(first, &second) {
            report.add_failure(format!("plan drifted between runs: {drift}"));
        }
    }

    /// Destroys applied state, removes scenario files and releases the
    /// target. Problems become warnings.
    async fn teardown(
        &self,
        workspace: &Workspace,
        applied: bool,
        lock: Option<TargetLock>,
        report: &mut ScenarioReport,
    ) {
        if applied {
            info!("Destroying applied resources");
            let invoker = &self.invoker;
            let destroyed = self
                .retry
                .run("destroy", move || invoker.destroy(workspace))
                .await;
            if let Err(e) = destroyed {
                warn!("Teardown warning: destroy failed: {}", e);
                report.teardown_warnings.push(format!("destroy failed: {e}"));
            }
        }

        // Without the lock the files may belong to another run.
        if let Some(lock) = lock {
            if !self.keep_artifacts {
                if let Err(e) = workspace.cleanup().await {
                    warn!("Teardown warning: cleanup failed: {}", e);
                    report.teardown_warnings.push(format!("cleanup failed: {e}"));
                }
            }
            if let Err(e) = lock.release().await {
                warn!("Teardown warning: {}", e);
                report.teardown_warnings.push(e.to_string());
            }
        }

        report.advance(ScenarioPhase::TornDown);
    }
}

/// Describes every address whose action differs between two plans.
fn action_drift(first: &PlanGraph, second: &PlanGraph) -> Vec<String> {
    let before = first.actions();
    let after = second.actions();
    let mut drift = Vec::new();

    for (address, action) in &before {
        match after.get(address) {
            Some(next) if next == action => {}
            Some(next) => drift.push(format!("{address}: {action} -> {next}")),
            None => drift.push(format!("{address}: {action} -> (absent)")),
        }
    }
    for (address, action) in &after {
        if !before.contains_key(address) {
            drift.push(format!("{address}: (absent) -> {action}"));
        }
    }

    drift
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
