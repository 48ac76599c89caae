//! Scenario input parameters.
//!
//! This module builds the named input set of a scenario: scalars, ordered
//! sequences and keyed mappings. Construction is local and synchronous; the
//! shape is validated by the planning engine, not here.

mod set;
mod value;

pub use set::{MapBuilder, ParameterSet, ParameterSetBuilder};
pub use value::ParamValue;
