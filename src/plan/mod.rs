//! Plan graph module.
//!
//! This module decodes the engine's machine-readable plan into an in-memory
//! resource graph that assertions query by address or type.

mod graph;
mod parser;

pub use graph::{
    ActionKind, PlanGraph, ResourceChange, ResourceType, format_instance_key, split_instance_key,
};
pub use parser::PlanParser;
