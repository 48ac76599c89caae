//! Pure predicates over a plan graph.
//!
//! Each predicate is independent: it reads the graph, never mutates it, and
//! returns either `Ok(())` or one [`AssertionFailure`] explaining the
//! mismatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::ParameterSet;
use crate::plan::{ActionKind, PlanGraph, ResourceChange};

use super::failure::{AssertionFailure, Check, FailureKind};
use super::path::AttributePath;

/// What to do when a targeted record has no "after" snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSnapshot {
    /// Treat the absent snapshot as a failure.
    #[default]
    Fail,
    /// Skip the record.
    Skip,
}

/// Fails if no record has `address` (exactly, or as a base address of
/// indexed instances).
///
/// # Errors
///
/// Returns a [`FailureKind::MissingAddress`] failure.
pub fn require_address_exists(graph: &PlanGraph, address: &str) -> Check {
    if graph.resolve(address).is_empty() {
        return Err(AssertionFailure::new(
            FailureKind::MissingAddress,
            format!("address_exists({address})"),
            format!("no resource change with address '{address}' in plan ({} records)", graph.len()),
        ));
    }
    Ok(())
}

/// Fails if a record with `address` exists and is not a true no-op.
///
/// # Errors
///
/// Returns a [`FailureKind::UnexpectedPresence`] failure naming the action.
pub fn require_absent(graph: &PlanGraph, address: &str) -> Check {
    if let Some(present) = graph.resolve(address).into_iter().find(|c| !c.action.is_noop()) {
        return Err(AssertionFailure::new(
            FailureKind::UnexpectedPresence,
            format!("absent({address})"),
            format!("'{}' is planned with action '{}'", present.address, present.action),
        ));
    }
    Ok(())
}

/// Fails unless every record at `address` has the given action.
///
/// # Errors
///
/// Returns [`FailureKind::MissingAddress`] or [`FailureKind::ActionMismatch`].
pub fn require_action(graph: &PlanGraph, address: &str, expected: &ActionKind) -> Check {
    let label = format!("action_is({address}, {expected})");
    let records = graph.resolve(address);
    if records.is_empty() {
        return Err(AssertionFailure::new(
            FailureKind::MissingAddress,
            label,
            format!("no resource change with address '{address}'"),
        ));
    }
    if let Some(other) = records.into_iter().find(|c| c.action != *expected) {
        return Err(AssertionFailure::new(
            FailureKind::ActionMismatch,
            label,
            format!("'{}' is planned with '{}', expected '{expected}'", other.address, other.action),
        ));
    }
    Ok(())
}

/// Navigates the "after" snapshot of every record at `address` by `path`
/// and requires a string-like value containing `substring`.
///
/// # Errors
///
/// Returns a failure that distinguishes a missing address, a missing
/// snapshot, an unresolved path, a non string-like value, and a missing
/// substring.
pub fn require_attribute_contains(
    graph: &PlanGraph,
    address: &str,
    path: &AttributePath,
    substring: &str,
    on_missing: MissingSnapshot,
) -> Check {
    let label = format!("attribute_contains({address}, {path}, {substring:?})");
    let records = graph.resolve(address);
    if records.is_empty() {
        return Err(AssertionFailure::new(
            FailureKind::MissingAddress,
            label,
            format!("no resource change with address '{address}'"),
        ));
    }
    check_records(&label, &records, path, substring, on_missing)
}

/// Same as [`require_attribute_contains`] for every record of a type.
///
/// # Errors
///
/// Returns [`FailureKind::MissingAddress`] when the plan has no record of the
/// type, otherwise the first per-record failure.
pub fn require_type_attribute_contains(
    graph: &PlanGraph,
    resource_type: &str,
    path: &AttributePath,
    substring: &str,
    on_missing: MissingSnapshot,
) -> Check {
    let label = format!("attribute_contains(type {resource_type}, {path}, {substring:?})");
    let records: Vec<&ResourceChange> = graph.of_type(resource_type).collect();
    if records.is_empty() {
        return Err(AssertionFailure::new(
            FailureKind::MissingAddress,
            label,
            format!("no resource change of type '{resource_type}'"),
        ));
    }
    check_records(&label, &records, path, substring, on_missing)
}

fn check_records(
    label: &str,
    records: &[&ResourceChange],
    path: &AttributePath,
    substring: &str,
    on_missing: MissingSnapshot,
) -> Check {
    for record in records {
        let Some(after) = &record.after else {
            match on_missing {
                MissingSnapshot::Skip => continue,
                MissingSnapshot::Fail => {
                    return Err(AssertionFailure::new(
                        FailureKind::MissingSnapshot,
                        label,
                        format!("'{}' has no after snapshot (action '{}')", record.address, record.action),
                    ));
                }
            }
        };

        let values = path.resolve(after);
        if values.is_empty() {
            return Err(AssertionFailure::new(
                FailureKind::AttributeMissing,
                label,
                format!("'{}' has no attribute '{path}'", record.address),
            ));
        }

        let texts: Vec<String> = values.into_iter().filter_map(string_like).collect();
        if texts.is_empty() {
            return Err(AssertionFailure::new(
                FailureKind::NotStringLike,
                label,
                format!("'{}' attribute '{path}' is not string-like", record.address),
            ));
        }

        if !texts.iter().any(|t| t.contains(substring)) {
            return Err(AssertionFailure::new(
                FailureKind::SubstringMissing,
                label,
                format!(
                    "'{}' attribute '{path}' = {} does not contain {substring:?}",
                    record.address,
                    texts.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

/// Strings, numbers and booleans are string-like; null and collections are not.
fn string_like(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Derives expected presence from the parameter set and checks the graph
/// agrees: expected present means the address exists with action `create`,
/// expected absent means [`require_absent`] holds.
///
/// # Errors
///
/// Returns the failure of the underlying existence, action, or absence check,
/// relabelled with the expectation.
pub fn require_conditional_inclusion<P>(
    graph: &PlanGraph,
    params: &ParameterSet,
    predicate: P,
    address: &str,
) -> Check
where
    P: FnOnce(&ParameterSet) -> bool,
{
    let expected = predicate(params);
    let label = format!(
        "conditional_inclusion({address}, expected {})",
        if expected { "present" } else { "absent" }
    );

    let result = if expected {
        require_address_exists(graph, address)
            .and_then(|()| require_action(graph, address, &ActionKind::Create))
    } else {
        require_absent(graph, address)
    };
    result.map_err(|failure| failure.relabel(label))
}

/// Fails unless the plan has exactly `count` records of a type (optionally
/// restricted to one action).
///
/// # Errors
///
/// Returns a [`FailureKind::CountMismatch`] failure.
pub fn require_resource_count(
    graph: &PlanGraph,
    resource_type: &str,
    action: Option<&ActionKind>,
    count: usize,
) -> Check {
    let found = graph
        .of_type(resource_type)
        .filter(|c| action.is_none_or(|a| c.action == *a))
        .count();
    if found != count {
        let scope = action.map_or_else(String::new, |a| format!(" with action '{a}'"));
        return Err(AssertionFailure::new(
            FailureKind::CountMismatch,
            format!("resource_count({resource_type}{scope})"),
            format!("expected {count} record(s) of type '{resource_type}'{scope}, found {found}"),
        ));
    }
    Ok(())
}

/// Fails if the planned-values tree has no resource at `address`.
///
/// # Errors
///
/// Returns a [`FailureKind::MissingPlannedValue`] failure.
pub fn require_planned_value(graph: &PlanGraph, address: &str) -> Check {
    if graph.has_planned_value(address) {
        return Ok(());
    }
    Err(AssertionFailure::new(
        FailureKind::MissingPlannedValue,
        format!("planned_value_exists({address})"),
        format!(
            "'{address}' not found among {} planned values",
            graph.planned_addresses().len()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanParser;
    use serde_json::json;

    fn graph() -> PlanGraph {
        PlanParser::new()
            .parse_value(&json!({
                "format_version": "1.2",
                "resource_changes": [
                    {
                        "address": "azurerm_cosmosdb_account.main",
                        "type": "azurerm_cosmosdb_account",
                        "name": "main",
                        "change": {
                            "actions": ["create"],
                            "after": {
                                "name": "cosmos-prod-westeurope",
                                "public_network_access_enabled": false,
                                "geo_location": [
                                    { "location": "westeurope", "failover_priority": 0 },
                                    { "location": "northeurope", "failover_priority": 1 }
                                ],
                                "capabilities": [{ "name": "EnableServerless" }]
                            }
                        }
                    },
                    {
                        "address": "azurerm_resource_group.unchanged",
                        "type": "azurerm_resource_group",
                        "name": "unchanged",
                        "change": { "actions": ["no-op"], "before": {}, "after": {} }
                    },
                    {
                        "address": "azurerm_cosmosdb_account.old",
                        "type": "azurerm_cosmosdb_account",
                        "name": "old",
                        "change": { "actions": ["delete"], "before": { "name": "x" }, "after": null }
                    }
                ]
            }))
            .unwrap()
    }

    fn path(raw: &str) -> AttributePath {
        AttributePath::parse(raw).unwrap()
    }

    #[test]
    fn test_address_exists() {
        let graph = graph();
        assert!(require_address_exists(&graph, "azurerm_cosmosdb_account.main").is_ok());
        let failure = require_address_exists(&graph, "azurerm_private_endpoint.cosmosdb").unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingAddress);
    }

    #[test]
    fn test_absent_tolerates_noop() {
        let graph = graph();
        assert!(require_absent(&graph, "azurerm_cosmosdb_notebook_workspace.main").is_ok());
        assert!(require_absent(&graph, "azurerm_resource_group.unchanged").is_ok());
        let failure = require_absent(&graph, "azurerm_cosmosdb_account.main").unwrap_err();
        assert_eq!(failure.kind, FailureKind::UnexpectedPresence);
        assert!(failure.message.contains("create"));
    }

    #[test]
    fn test_attribute_contains_distinct_failures() {
        let graph = graph();
        let account = "azurerm_cosmosdb_account.main";

        assert!(require_attribute_contains(&graph, account, &path("name"), "prod", MissingSnapshot::Fail).is_ok());
        assert!(
            require_attribute_contains(&graph, account, &path("geo_location.*.location"), "northeurope", MissingSnapshot::Fail)
                .is_ok()
        );

        let kind = |p: &str, s: &str| {
            require_attribute_contains(&graph, account, &path(p), s, MissingSnapshot::Fail)
                .unwrap_err()
                .kind
        };
        assert_eq!(kind("name", "test"), FailureKind::SubstringMissing);
        assert_eq!(kind("kind", "Global"), FailureKind::AttributeMissing);
        assert_eq!(kind("geo_location", "westeurope"), FailureKind::NotStringLike);
    }

    #[test]
    fn test_missing_snapshot_policy() {
        let graph = graph();
        let old = "azurerm_cosmosdb_account.old";

        let failure = require_attribute_contains(&graph, old, &path("name"), "x", MissingSnapshot::Fail).unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingSnapshot);
        assert!(require_attribute_contains(&graph, old, &path("name"), "x", MissingSnapshot::Skip).is_ok());
    }

    #[test]
    fn test_type_attribute_contains_skips_pending_deletion() {
        let graph = graph();
        assert!(
            require_type_attribute_contains(&graph, "azurerm_cosmosdb_account", &path("name"), "prod", MissingSnapshot::Skip)
                .is_ok()
        );
        let failure =
            require_type_attribute_contains(&graph, "azurerm_key_vault", &path("name"), "prod", MissingSnapshot::Skip)
                .unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingAddress);
    }

    #[test]
    fn test_conditional_inclusion_both_directions() {
        let graph = graph();
        let enabled = ParameterSet::builder().value("public_network_access_enabled", false).build().unwrap();

        let account = "azurerm_cosmosdb_account.main";
        assert!(require_conditional_inclusion(&graph, &enabled, |_| true, account).is_ok());

        let failure = require_conditional_inclusion(&graph, &enabled, |_| false, account).unwrap_err();
        assert_eq!(failure.kind, FailureKind::UnexpectedPresence);
        assert!(failure.assertion.contains("expected absent"));

        let workspace = "azurerm_cosmosdb_notebook_workspace.main";
        let failure = require_conditional_inclusion(&graph, &enabled, |_| true, workspace).unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingAddress);
        assert!(require_conditional_inclusion(&graph, &enabled, |p| p.is_truthy("enable_notebook_workspace"), workspace).is_ok());
    }

    #[test]
    fn test_conditional_inclusion_requires_create() {
        let graph = graph();
        let params = ParameterSet::default();
        let failure =
            require_conditional_inclusion(&graph, &params, |_| true, "azurerm_resource_group.unchanged").unwrap_err();
        assert_eq!(failure.kind, FailureKind::ActionMismatch);
    }

    #[test]
    fn test_resource_count_and_planned_value() {
        let graph = graph();
        assert!(require_resource_count(&graph, "azurerm_cosmosdb_account", None, 2).is_ok());
        assert!(require_resource_count(&graph, "azurerm_cosmosdb_account", Some(&ActionKind::Create), 1).is_ok());
        let failure = require_resource_count(&graph, "azurerm_cosmosdb_account", Some(&ActionKind::Update), 1).unwrap_err();
        assert_eq!(failure.kind, FailureKind::CountMismatch);
        assert_eq!(
            require_planned_value(&graph, "azurerm_cosmosdb_account.main").unwrap_err().kind,
            FailureKind::MissingPlannedValue
        );
    }
}
