//! Assertion library.
//!
//! This module provides:
//! - Pure predicates over a [`PlanGraph`](crate::plan::PlanGraph)
//! - Attribute paths into "after" snapshots
//! - The declarative [`Assertion`] form used by suite files

mod assertion;
mod failure;
mod path;
mod predicates;

pub use assertion::{
    ActionCheck, Assertion, AttributeCheck, CountCheck, InclusionCheck, ParamCondition, evaluate,
};
pub use failure::{AssertionFailure, AssertionReport, Check, FailureKind};
pub use path::AttributePath;
pub use predicates::{
    MissingSnapshot, require_absent, require_action, require_address_exists,
    require_attribute_contains, require_conditional_inclusion, require_planned_value,
    require_resource_count, require_type_attribute_contains,
};
