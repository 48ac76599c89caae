//! Decoder for the engine's JSON plan document.
//!
//! The parser reads the `show -json` output of a saved plan. It checks the
//! envelope by hand so a missing field is reported by its path, then decodes
//! each `resource_changes` entry into a [`ResourceChange`].

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;

use super::graph::{ActionKind, PlanGraph, ResourceChange, ResourceType, format_instance_key};

/// Stateless plan document parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanParser;

/// Raw `resource_changes[]` entry.
#[derive(Debug, Deserialize)]
struct RawResourceChange {
    address: Option<String>,
    module_address: Option<String>,
    mode: Option<String>,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    name: Option<String>,
    index: Option<Value>,
    provider_name: Option<String>,
    change: Option<RawChange>,
}

/// Raw `change` object.
#[derive(Debug, Deserialize)]
struct RawChange {
    actions: Option<Vec<String>>,
    #[serde(default)]
    before: Value,
    #[serde(default)]
    after: Value,
}

impl PlanParser {
    /// Creates a parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parses a plan document.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, the envelope lacks
    /// `format_version`, an entry is malformed, or two entries share an
    /// address.
    pub fn parse(&self, raw: &str) -> Result<PlanGraph, ParseError> {
        let document: Value = serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson {
            message: e.to_string(),
        })?;
        self.parse_value(&document)
    }

    /// Parses an already decoded plan document.
    ///
    /// # Errors
    ///
    /// See [`PlanParser::parse`].
    pub fn parse_value(&self, document: &Value) -> Result<PlanGraph, ParseError> {
        let root = document
            .as_object()
            .ok_or_else(|| ParseError::missing("format_version"))?;

        let format_version = root
            .get("format_version")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::missing("format_version"))?;

        let engine_version = root
            .get("terraform_version")
            .and_then(Value::as_str)
            .map(str::to_string);

        // The engine omits `resource_changes` entirely for an empty plan.
        let entries = match root.get("resource_changes") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(_) => return Err(ParseError::missing("resource_changes")),
        };

        let changes = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| Self::parse_entry(i, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let mut planned = BTreeSet::new();
        if let Some(root_module) = root
            .get("planned_values")
            .and_then(|p| p.get("root_module"))
        {
            collect_planned(root_module, &mut planned);
        }

        debug!(
            "Parsed plan: {} resource changes, {} planned values",
            changes.len(),
            planned.len()
        );

        Ok(PlanGraph::from_changes(format_version, changes)?
            .with_engine_version(engine_version)
            .with_planned_values(planned))
    }

    fn parse_entry(index: usize, entry: &Value) -> Result<ResourceChange, ParseError> {
        let raw: RawResourceChange =
            serde_json::from_value(entry.clone()).map_err(|e| ParseError::entry(index, e.to_string()))?;

        let field = |name: &str| format!("resource_changes[{index}].{name}");

        let resource_type = raw.resource_type.ok_or_else(|| ParseError::missing(field("type")))?;
        let change = raw.change.ok_or_else(|| ParseError::missing(field("change")))?;
        let actions = change
            .actions
            .ok_or_else(|| ParseError::missing(field("change.actions")))?;
        if actions.is_empty() {
            return Err(ParseError::entry(index, "change.actions is empty"));
        }

        let name = raw.name.unwrap_or_default();
        let address = match raw.address {
            Some(address) if !address.is_empty() => address,
            _ => {
                if name.is_empty() {
                    return Err(ParseError::missing(field("address")));
                }
                compose_address(
                    raw.module_address.as_deref(),
                    raw.mode.as_deref(),
                    &resource_type,
                    &name,
                    raw.index.as_ref(),
                )
            }
        };

        Ok(ResourceChange {
            address,
            resource_type: ResourceType::new(resource_type),
            name,
            module_address: raw.module_address,
            index: raw.index.filter(|v| !v.is_null()),
            provider_name: raw.provider_name,
            action: ActionKind::from_actions(&actions),
            before: snapshot(index, "before", change.before)?,
            after: snapshot(index, "after", change.after)?,
        })
    }
}

fn snapshot(
    index: usize,
    which: &str,
    value: Value,
) -> Result<Option<Map<String, Value>>, ParseError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(ParseError::entry(
            index,
            format!("change.{which} must be an object or null, found {other}"),
        )),
    }
}

/// Builds `module.m.data.type.name[idx]` from its parts.
fn compose_address(
    module_address: Option<&str>,
    mode: Option<&str>,
    resource_type: &str,
    name: &str,
    index: Option<&Value>,
) -> String {
    let mut address = String::new();
    if let Some(module) = module_address.filter(|m| !m.is_empty()) {
        address.push_str(module);
        address.push('.');
    }
    if mode == Some("data") {
        address.push_str("data.");
    }
    address.push_str(resource_type);
    address.push('.');
    address.push_str(name);
    if let Some(index) = index.filter(|v| !v.is_null()) {
        address.push_str(&format_instance_key(index));
    }
    address
}

fn collect_planned(module: &Value, planned: &mut BTreeSet<String>) {
    if let Some(resources) = module.get("resources").and_then(Value::as_array) {
        planned.extend(
            resources
                .iter()
                .filter_map(|r| r.get("address").and_then(Value::as_str))
                .map(str::to_string),
        );
    }
    if let Some(children) = module.get("child_modules").and_then(Value::as_array) {
        for child in children {
            collect_planned(child, planned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(document: &Value) -> Result<PlanGraph, ParseError> {
        PlanParser::new().parse_value(document)
    }

    #[test]
    fn test_parse_minimal_plan() {
        let graph = parse(&json!({
            "format_version": "1.2",
            "terraform_version": "1.9.5",
            "resource_changes": [{
                "address": "azurerm_cosmosdb_account.main",
                "type": "azurerm_cosmosdb_account",
                "name": "main",
                "change": {
                    "actions": ["create"],
                    "before": null,
                    "after": { "name": "cosmos-test-westeurope", "kind": "GlobalDocumentDB" }
                }
            }]
        }))
        .unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.engine_version.as_deref(), Some("1.9.5"));
        let account = graph.get("azurerm_cosmosdb_account.main").unwrap();
        assert_eq!(account.action, ActionKind::Create);
        assert!(account.before.is_none());
        assert_eq!(account.after.as_ref().unwrap()["kind"], json!("GlobalDocumentDB"));
    }

    #[test]
    fn test_missing_format_version() {
        let err = parse(&json!({ "resource_changes": [] })).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { ref field } if field == "format_version"));
    }

    #[test]
    fn test_missing_actions_reports_path() {
        let err = parse(&json!({
            "format_version": "1.2",
            "resource_changes": [{ "address": "a.b", "type": "a", "change": {} }]
        }))
        .unwrap_err();
        assert!(
            matches!(err, ParseError::MissingField { ref field } if field == "resource_changes[0].change.actions")
        );
    }

    #[test]
    fn test_resource_changes_wrong_shape() {
        let err = parse(&json!({ "format_version": "1.2", "resource_changes": {} })).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { .. }));
    }

    #[test]
    fn test_empty_plan_without_resource_changes() {
        let graph = parse(&json!({ "format_version": "1.2" })).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_pending_deletion_and_unknown_type() {
        let graph = parse(&json!({
            "format_version": "1.2",
            "resource_changes": [{
                "address": "vendor_widget.legacy",
                "type": "vendor_widget",
                "name": "legacy",
                "change": { "actions": ["delete"], "before": { "id": "w-1" }, "after": null }
            }]
        }))
        .unwrap();

        let widget = graph.get("vendor_widget.legacy").unwrap();
        assert_eq!(widget.action, ActionKind::Delete);
        assert!(widget.after.is_none());
        assert_eq!(widget.resource_type.as_str(), "vendor_widget");
    }

    #[test]
    fn test_address_composed_when_absent() {
        let graph = parse(&json!({
            "format_version": "1.2",
            "resource_changes": [
                {
                    "module_address": "module.cosmos",
                    "type": "azurerm_private_endpoint",
                    "name": "this",
                    "index": "cosmosdb",
                    "change": { "actions": ["create"] }
                },
                {
                    "mode": "data",
                    "type": "azurerm_client_config",
                    "name": "current",
                    "change": { "actions": ["read"] }
                }
            ]
        }))
        .unwrap();

        assert!(graph.get(r#"module.cosmos.azurerm_private_endpoint.this["cosmosdb"]"#).is_some());
        assert!(graph.get("data.azurerm_client_config.current").is_some());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let entry = json!({
            "address": "azurerm_cosmosdb_account.main",
            "type": "azurerm_cosmosdb_account",
            "name": "main",
            "change": { "actions": ["create"] }
        });
        let err = parse(&json!({
            "format_version": "1.2",
            "resource_changes": [entry.clone(), entry]
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::DuplicateAddress { .. }));
    }

    #[test]
    fn test_planned_values_walk_child_modules() {
        let graph = parse(&json!({
            "format_version": "1.2",
            "planned_values": {
                "root_module": {
                    "resources": [{ "address": "azurerm_cosmosdb_account.main" }],
                    "child_modules": [{
                        "address": "module.net",
                        "resources": [{ "address": "module.net.azurerm_private_endpoint.this[0]" }]
                    }]
                }
            }
        }))
        .unwrap();

        assert!(graph.has_planned_value("azurerm_cosmosdb_account.main"));
        assert!(graph.has_planned_value("module.net.azurerm_private_endpoint.this"));
        assert!(!graph.has_planned_value("azurerm_cosmosdb_notebook_workspace.main"));
    }

    #[test]
    fn test_invalid_json() {
        let err = PlanParser::new().parse("Error: No configuration files").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));
    }
}
