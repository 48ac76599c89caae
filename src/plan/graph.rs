//! In-memory resource graph of one plan.
//!
//! A [`PlanGraph`] is the ordered list of resource changes the engine reported,
//! indexed by address. Resource types and action kinds are open values: an
//! unknown type or action passes through untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Opaque resource type tag (e.g. `azurerm_cosmosdb_account`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceType(String);

/// Effect a plan would have on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    /// Resource will be created.
    Create,
    /// Resource will be updated in place.
    Update,
    /// Resource will be destroyed.
    Delete,
    /// Nothing changes.
    NoOp,
    /// Resource will be destroyed and recreated (either order).
    Replace,
    /// Data source will be read during apply.
    Read,
    /// Any action list the harness does not name.
    Other(String),
}

/// One resource change record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChange {
    /// Unique flat address.
    pub address: String,
    /// Resource type tag.
    pub resource_type: ResourceType,
    /// Resource name within its module.
    pub name: String,
    /// Containing module address, if not the root module.
    pub module_address: Option<String>,
    /// Instance key for `count`/`for_each` resources.
    pub index: Option<Value>,
    /// Provider that owns the resource.
    pub provider_name: Option<String>,
    /// Planned action.
    pub action: ActionKind,
    /// Attribute snapshot before the change (absent on create).
    pub before: Option<Map<String, Value>>,
    /// Attribute snapshot after the change (absent on delete).
    pub after: Option<Map<String, Value>>,
}

/// Parsed plan, indexed by address.
#[derive(Debug, Clone, Default)]
pub struct PlanGraph {
    /// Plan document format version.
    pub format_version: String,
    /// Engine version that produced the plan.
    pub engine_version: Option<String>,
    changes: Vec<ResourceChange>,
    by_address: HashMap<String, usize>,
    planned: BTreeSet<String>,
}

impl ResourceType {
    /// Creates a type tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl PartialEq<str> for ResourceType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl ActionKind {
    /// Maps an engine action list to an action kind.
    #[must_use]
    pub fn from_actions<S: AsRef<str>>(actions: &[S]) -> Self {
        let actions: Vec<&str> = actions.iter().map(AsRef::as_ref).collect();
        match actions.as_slice() {
            ["create"] => Self::Create,
            ["update"] => Self::Update,
            ["delete"] => Self::Delete,
            ["no-op"] => Self::NoOp,
            ["read"] => Self::Read,
            ["delete", "create"] | ["create", "delete"] => Self::Replace,
            other => Self::Other(other.join(",")),
        }
    }

    /// Parses the textual form produced by [`ActionKind::as_str`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "no-op" | "noop" => Self::NoOp,
            "replace" => Self::Replace,
            "read" => Self::Read,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the action as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
            Self::Replace => "replace",
            Self::Read => "read",
            Self::Other(s) => s,
        }
    }

    /// Returns true for a true no-op.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for ActionKind {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<ActionKind> for String {
    fn from(action: ActionKind) -> Self {
        action.as_str().to_string()
    }
}

impl ResourceChange {
    /// Address without the trailing instance key.
    #[must_use]
    pub fn base_address(&self) -> &str {
        split_instance_key(&self.address).0
    }

    /// Returns true if `query` names this record exactly or names its base
    /// address (any instance).
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        self.address == query || self.base_address() == query
    }
}

impl PlanGraph {
    /// Builds a graph from records, rejecting duplicate addresses.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::DuplicateAddress`] if two records share an address.
    pub fn from_changes(
        format_version: impl Into<String>,
        changes: Vec<ResourceChange>,
    ) -> Result<Self, ParseError> {
        let mut by_address = HashMap::with_capacity(changes.len());
        for (i, change) in changes.iter().enumerate() {
            if by_address.insert(change.address.clone(), i).is_some() {
                return Err(ParseError::DuplicateAddress {
                    address: change.address.clone(),
                });
            }
        }

        Ok(Self {
            format_version: format_version.into(),
            engine_version: None,
            changes,
            by_address,
            planned: BTreeSet::new(),
        })
    }

    /// Records the planned-values addresses.
    #[must_use]
    pub fn with_planned_values(mut self, planned: BTreeSet<String>) -> Self {
        self.planned = planned;
        self
    }

    /// Records the engine version.
    #[must_use]
    pub fn with_engine_version(mut self, version: Option<String>) -> Self {
        self.engine_version = version;
        self
    }

    /// Looks up a record by exact address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ResourceChange> {
        self.by_address.get(address).map(|&i| &self.changes[i])
    }

    /// Resolves an address: the exact record if present, otherwise every
    /// indexed instance of that base address.
    #[must_use]
    pub fn resolve(&self, address: &str) -> Vec<&ResourceChange> {
        if let Some(change) = self.get(address) {
            return vec![change];
        }
        self.changes.iter().filter(|c| c.matches(address)).collect()
    }

    /// Records with the given type tag, in plan order.
    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a ResourceChange> {
        self.changes
            .iter()
            .filter(move |c| c.resource_type == *resource_type)
    }

    /// Iterates records in plan order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the plan has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns true if the planned-values tree has this address or an
    /// instance of it.
    #[must_use]
    pub fn has_planned_value(&self, address: &str) -> bool {
        self.planned.contains(address)
            || self
                .planned
                .iter()
                .any(|a| split_instance_key(a).0 == address)
    }

    /// Planned-values addresses.
    #[must_use]
    pub const fn planned_addresses(&self) -> &BTreeSet<String> {
        &self.planned
    }

    /// Address to action map, sorted by address.
    #[must_use]
    pub fn actions(&self) -> BTreeMap<&str, &ActionKind> {
        self.changes
            .iter()
            .map(|c| (c.address.as_str(), &c.action))
            .collect()
    }

    /// Number of records per action kind.
    #[must_use]
    pub fn action_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for change in &self.changes {
            *counts.entry(change.action.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Splits `type.name["key"]` into (`type.name`, `Some("[\"key\"]")`).
///
/// Brackets inside quoted keys are ignored.
#[must_use]
pub fn split_instance_key(address: &str) -> (&str, Option<&str>) {
    if !address.ends_with(']') {
        return (address, None);
    }

    let mut in_quotes = false;
    let mut escaped = false;
    let mut last_open = None;
    for (i, ch) in address.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => last_open = Some(i),
            _ => {}
        }
    }

    match last_open {
        Some(i) => (&address[..i], Some(&address[i..])),
        None => (address, None),
    }
}

/// Formats an instance key the way engine addresses print it.
#[must_use]
pub fn format_instance_key(index: &Value) -> String {
    match index {
        Value::String(s) => format!("[{}]", Value::String(s.clone())),
        other => format!("[{other}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(address: &str, resource_type: &str, action: ActionKind) -> ResourceChange {
        ResourceChange {
            address: address.to_string(),
            resource_type: ResourceType::from(resource_type),
            name: String::from("main"),
            module_address: None,
            index: None,
            provider_name: None,
            action,
            before: None,
            after: None,
        }
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(ActionKind::from_actions(&["create"]), ActionKind::Create);
        assert_eq!(ActionKind::from_actions(&["delete", "create"]), ActionKind::Replace);
        assert_eq!(ActionKind::from_actions(&["create", "delete"]), ActionKind::Replace);
        assert_eq!(ActionKind::from_actions(&["no-op"]), ActionKind::NoOp);
        assert_eq!(
            ActionKind::from_actions(&["forget"]),
            ActionKind::Other(String::from("forget"))
        );
        assert_eq!(ActionKind::parse("replace"), ActionKind::Replace);
    }

    #[test]
    fn test_split_instance_key() {
        assert_eq!(split_instance_key("a.b"), ("a.b", None));
        assert_eq!(split_instance_key("a.b[0]"), ("a.b", Some("[0]")));
        assert_eq!(
            split_instance_key(r#"module.m["x"].a.b["k[1]"]"#),
            (r#"module.m["x"].a.b"#, Some(r#"["k[1]"]"#))
        );
    }

    #[test]
    fn test_format_instance_key() {
        assert_eq!(format_instance_key(&serde_json::json!(0)), "[0]");
        assert_eq!(format_instance_key(&serde_json::json!("appdb")), r#"["appdb"]"#);
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let result = PlanGraph::from_changes(
            "1.2",
            vec![
                change("azurerm_cosmosdb_account.main", "azurerm_cosmosdb_account", ActionKind::Create),
                change("azurerm_cosmosdb_account.main", "azurerm_cosmosdb_account", ActionKind::Update),
            ],
        );
        assert!(matches!(result, Err(ParseError::DuplicateAddress { .. })));
    }

    #[test]
    fn test_resolve_exact_then_instances() {
        let graph = PlanGraph::from_changes(
            "1.2",
            vec![
                change(r#"azurerm_cosmosdb_sql_database.sql_databases["appdb"]"#, "azurerm_cosmosdb_sql_database", ActionKind::Create),
                change(r#"azurerm_cosmosdb_sql_database.sql_databases["logs"]"#, "azurerm_cosmosdb_sql_database", ActionKind::Create),
                change("azurerm_cosmosdb_account.main", "azurerm_cosmosdb_account", ActionKind::Create),
            ],
        )
        .unwrap();

        assert_eq!(graph.resolve("azurerm_cosmosdb_sql_database.sql_databases").len(), 2);
        assert_eq!(graph.resolve("azurerm_cosmosdb_account.main").len(), 1);
        assert!(graph.resolve("azurerm_cosmosdb_account").is_empty());
        assert_eq!(graph.of_type("azurerm_cosmosdb_sql_database").count(), 2);
        assert_eq!(graph.action_counts().get("create"), Some(&3));
    }
}
