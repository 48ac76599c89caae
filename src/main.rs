//! Plan harness CLI entrypoint.
//!
//! This is the main entrypoint for the plan-harness command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use plan_harness::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use plan_harness::config::{ConfigParser, ConfigValidator, SuiteConfig, find_config_file};
use plan_harness::engine::CliEngine;
use plan_harness::error::Result;
use plan_harness::plan::PlanParser;
use plan_harness::runner::{RetryPolicy, Scenario, ScenarioRunner, TargetLocks, lock_expiry};

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Run {
            filter,
            parallelism,
            fail_fast,
            keep_artifacts,
        } => {
            cmd_run(
                cli.suite.as_ref(),
                filter.as_deref(),
                parallelism,
                fail_fast,
                keep_artifacts,
                &formatter,
            )
            .await
        }
        Commands::Validate { warnings } => cmd_validate(cli.suite.as_ref(), warnings, &formatter),
        Commands::List => cmd_list(cli.suite.as_ref(), &formatter),
        Commands::Inspect { plan, address } => {
            cmd_inspect(&plan, address.as_deref(), cli.output, &formatter)
        }
    }
}

/// Run the suite.
async fn cmd_run(
    suite_path: Option<&PathBuf>,
    filter: Option<&str>,
    parallelism: Option<usize>,
    fail_fast: bool,
    keep_artifacts: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let suite = load_suite(suite_path, true)?;

    let scenarios = suite
        .filtered(filter)
        .map(|s| Scenario::from_config(s, &suite.defaults))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if scenarios.is_empty() {
        eprintln!("No scenarios match filter '{}'.", filter.unwrap_or_default());
        return Ok(ExitCode::FAILURE);
    }

    let engine = CliEngine::from_config(&suite.engine);
    info!(
        "Using engine '{}' (step timeout {:?})",
        engine.program(),
        engine.step_timeout()
    );

    let retry = RetryPolicy::from_config(&suite.retry)?;
    let locks = TargetLocks::new().with_expiry(lock_expiry(engine.step_timeout(), &retry));
    debug!("Lock files held by {}", locks.holder());

    let runner = ScenarioRunner::new(Arc::new(engine))
        .with_retry(retry)
        .with_locks(Arc::new(locks))
        .with_parallelism(parallelism.unwrap_or(suite.engine.parallelism))
        .with_fail_fast(fail_fast)
        .keep_artifacts(keep_artifacts);

    let report = runner.run_all(scenarios).await;
    emit(&formatter.format_suite(&report))?;

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Validate the suite.
fn cmd_validate(
    suite_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let suite_file = resolve_suite_path(suite_path)?;
    info!("Validating suite: {}", suite_file.display());

    let parser = ConfigParser::new();
    let suite = parser.load_file(&suite_file)?;
    let result = ConfigValidator::new().check(&suite);

    emit(&formatter.format_validation(&result, show_warnings))?;

    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// List the suite's scenarios.
fn cmd_list(suite_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let suite = load_suite(suite_path, false)?;
    emit(&formatter.format_scenarios(&suite))?;
    Ok(ExitCode::SUCCESS)
}

/// Parse a saved plan document.
fn cmd_inspect(
    plan_path: &Path,
    address: Option<&str>,
    output: OutputFormat,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let document = std::fs::read_to_string(plan_path)?;
    let graph = PlanParser::new().parse(&document)?;

    let Some(address) = address else {
        emit(&formatter.format_graph(&graph))?;
        return Ok(ExitCode::SUCCESS);
    };

    let matches = graph.resolve(address);
    if matches.is_empty() {
        if output == OutputFormat::Text {
            eprintln!("No resource at address '{address}'.");
        }
        return Ok(ExitCode::FAILURE);
    }
    for change in matches {
        emit(&formatter.format_change(change))?;
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text.trim_end())?;
    stdout.flush()?;
    Ok(())
}

/// Resolves the suite file path.
fn resolve_suite_path(suite_path: Option<&PathBuf>) -> Result<PathBuf> {
    suite_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads, overrides and validates the suite.
fn load_suite(suite_path: Option<&PathBuf>, check_targets: bool) -> Result<SuiteConfig> {
    let suite_file = resolve_suite_path(suite_path)?;
    debug!("Loading suite from: {}", suite_file.display());

    let parser = ConfigParser::new().with_base_path(
        suite_file
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    );
    parser.load_dotenv()?;

    let suite = parser.load_with_env(&suite_file)?;

    let validator = if check_targets {
        ConfigValidator::new()
    } else {
        ConfigValidator::new().without_target_check()
    };
    let result = validator.validate(&suite)?;
    for warning in &result.warnings {
        warn!("{}", warning);
    }

    Ok(suite)
}
