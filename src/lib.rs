// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Plan Harness
//!
//! A plan-validation harness for Terraform-compatible infrastructure
//! configurations.
//!
//! ## Overview
//!
//! The harness lets you check a configuration by planning it, not by
//! deploying it:
//!
//! - Build a parameter set for each scenario
//! - Run the planning engine (`init`, `plan`, `show -json`) in dry-run mode
//! - Parse the machine-readable plan into a resource graph
//! - Assert on addresses, actions and attribute values
//! - Tear down exactly once, whatever happened
//!
//! ## Architecture
//!
//! Each scenario moves through `Built -> Planned -> Asserted -> TornDown`:
//!
//! 1. **Parameters**: Defined in `plan-harness.yaml`
//! 2. **Plan**: Produced by the engine against the target directory
//! 3. **Assertions**: Pure predicates over the parsed plan graph
//!
//! ## Modules
//!
//! - [`params`]: Scenario input parameters
//! - [`engine`]: Planning engine contract and process invoker
//! - [`plan`]: Plan document parsing and the resource graph
//! - [`assertions`]: Predicates over the resource graph
//! - [`runner`]: Scenario lifecycle, retries, locking and reports
//! - [`config`]: Suite file parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! scenarios:
//!   - name: basic
//!     target: ../modules/cosmosdb
//!     vars:
//!       resource_group_name: rg-test
//!       location: westeurope
//!       geo_locations:
//!         - location: westeurope
//!           failover_priority: 0
//!     assertions:
//!       - action_is:
//!           address: azurerm_cosmosdb_account.main
//!           action: create
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod assertions;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod plan;
pub mod runner;

// ============================================================================
// Re-exports
// ============================================================================

pub use assertions::{Assertion, AssertionFailure, AssertionReport, evaluate};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, SuiteConfig};
pub use engine::{CliEngine, ExecutionMode, PlanEngine, PlanInvoker, Workspace};
pub use error::{HarnessError, Result};
pub use params::{MapBuilder, ParamValue, ParameterSet};
pub use plan::{ActionKind, PlanGraph, PlanParser, ResourceChange};
pub use runner::{RetryPolicy, Scenario, ScenarioReport, ScenarioRunner, SuiteReport};
