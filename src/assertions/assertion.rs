//! Declarative assertions as they appear in a suite file.
//!
//! ```yaml
//! assertions:
//!   - address_exists: azurerm_cosmosdb_account.main
//!   - attribute_contains:
//!       type: azurerm_cosmosdb_account
//!       path: name
//!       substring: prod
//!       on_missing_snapshot: skip
//!   - conditional_inclusion:
//!       address: azurerm_cosmosdb_notebook_workspace.main
//!       when: { flag: enable_notebook_workspace }
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::params::{ParamValue, ParameterSet};
use crate::plan::{ActionKind, PlanGraph};

use super::failure::{AssertionFailure, AssertionReport, Check, FailureKind};
use super::path::AttributePath;
use super::predicates::{
    MissingSnapshot, require_absent, require_action, require_address_exists,
    require_attribute_contains, require_conditional_inclusion, require_planned_value,
    require_resource_count, require_type_attribute_contains,
};

/// One assertion against a plan graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assertion {
    /// The address must exist.
    AddressExists(String),
    /// The address must be absent (or a no-op).
    Absent(String),
    /// An "after" attribute must contain a substring.
    AttributeContains(AttributeCheck),
    /// Presence must follow a condition on the parameter set.
    ConditionalInclusion(InclusionCheck),
    /// The address must be planned with a given action.
    ActionIs(ActionCheck),
    /// Number of records of a type.
    ResourceCount(CountCheck),
    /// The address must appear in the planned-values tree.
    PlannedValueExists(String),
}

/// Attribute content check, targeting one address or every record of a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeCheck {
    /// Target address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Target resource type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Path into the "after" snapshot.
    pub path: AttributePath,
    /// Expected substring.
    pub substring: String,
    /// Policy for records without an "after" snapshot.
    #[serde(default)]
    pub on_missing_snapshot: MissingSnapshot,
}

/// Conditional inclusion check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InclusionCheck {
    /// Address of the optional resource.
    pub address: String,
    /// Condition under which the resource is expected.
    pub when: ParamCondition,
}

/// Action check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionCheck {
    /// Target address.
    pub address: String,
    /// Expected action.
    pub action: ActionKind,
}

/// Record count check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountCheck {
    /// Resource type to count.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Expected count.
    pub count: usize,
    /// Only count records with this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
}

/// A predicate on the parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamCondition {
    /// The parameter is present and truthy.
    Flag(String),
    /// The parameter is present and not null.
    Present(String),
    /// The parameter renders to the given text.
    Equals {
        /// Parameter name.
        param: String,
        /// Expected text.
        value: String,
    },
    /// The parameter is a mapping containing the key.
    HasKey {
        /// Parameter name.
        param: String,
        /// Expected key.
        key: String,
    },
    /// Negation.
    Not(Box<ParamCondition>),
    /// Every condition holds.
    All(Vec<ParamCondition>),
    /// At least one condition holds.
    Any(Vec<ParamCondition>),
}

impl ParamCondition {
    /// Evaluates the condition.
    #[must_use]
    pub fn evaluate(&self, params: &ParameterSet) -> bool {
        match self {
            Self::Flag(name) => params.is_truthy(name),
            Self::Present(name) => params.get(name).is_some_and(|v| *v != ParamValue::Null),
            Self::Equals { param, value } => params
                .get(param)
                .is_some_and(|v| v.to_string() == *value),
            Self::HasKey { param, key } => params
                .get(param)
                .and_then(ParamValue::as_map)
                .is_some_and(|m| m.contains_key(key)),
            Self::Not(inner) => !inner.evaluate(params),
            Self::All(all) => all.iter().all(|c| c.evaluate(params)),
            Self::Any(any) => any.iter().any(|c| c.evaluate(params)),
        }
    }
}

impl Assertion {
    /// Short label for listings.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::AddressExists(address) => format!("address_exists({address})"),
            Self::Absent(address) => format!("absent({address})"),
            Self::AttributeContains(check) => {
                let target = check.address.as_deref().map_or_else(
                    || format!("type {}", check.resource_type.as_deref().unwrap_or_default()),
                    str::to_string,
                );
                format!("attribute_contains({target}, {}, {:?})", check.path, check.substring)
            }
            Self::ConditionalInclusion(check) => format!("conditional_inclusion({})", check.address),
            Self::ActionIs(check) => format!("action_is({}, {})", check.address, check.action),
            Self::ResourceCount(check) => {
                format!("resource_count({}) == {}", check.resource_type, check.count)
            }
            Self::PlannedValueExists(address) => format!("planned_value_exists({address})"),
        }
    }

    /// Evaluates the assertion against a graph.
    ///
    /// # Errors
    ///
    /// Returns the failure of the underlying predicate.
    pub fn check(&self, graph: &PlanGraph, params: &ParameterSet) -> Check {
        match self {
            Self::AddressExists(address) => require_address_exists(graph, address),
            Self::Absent(address) => require_absent(graph, address),
            Self::AttributeContains(check) => match (&check.address, &check.resource_type) {
                (Some(address), _) => require_attribute_contains(
                    graph,
                    address,
                    &check.path,
                    &check.substring,
                    check.on_missing_snapshot,
                ),
                (None, Some(resource_type)) => require_type_attribute_contains(
                    graph,
                    resource_type,
                    &check.path,
                    &check.substring,
                    check.on_missing_snapshot,
                ),
                (None, None) => Err(AssertionFailure::new(
                    FailureKind::MissingAddress,
                    self.label(),
                    "attribute check names neither an address nor a type",
                )),
            },
            Self::ConditionalInclusion(check) => {
                require_conditional_inclusion(graph, params, |p| check.when.evaluate(p), &check.address)
            }
            Self::ActionIs(check) => require_action(graph, &check.address, &check.action),
            Self::ResourceCount(check) => {
                require_resource_count(graph, &check.resource_type, check.action.as_ref(), check.count)
            }
            Self::PlannedValueExists(address) => require_planned_value(graph, address),
        }
    }
}

/// Evaluates assertions in order, collecting every failure unless
/// `fail_fast` is set.
#[must_use]
pub fn evaluate(
    assertions: &[Assertion],
    graph: &PlanGraph,
    params: &ParameterSet,
    fail_fast: bool,
) -> AssertionReport {
    let mut report = AssertionReport::default();

    for (i, assertion) in assertions.iter().enumerate() {
        report.evaluated += 1;
        if let Err(failure) = assertion.check(graph, params) {
            debug!("Assertion failed: {}", failure);
            report.failures.push(failure);
            if fail_fast {
                report.skipped = assertions.len() - i - 1;
                break;
            }
        }
    }

    report
}
