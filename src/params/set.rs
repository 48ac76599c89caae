//! Parameter sets and their builders.
//!
//! A [`ParameterSet`] is the input of one scenario: a mapping from variable
//! name to [`ParamValue`]. Construction goes through [`ParameterSetBuilder`],
//! which defers every duplicate-key check to [`ParameterSetBuilder::build`]
//! so literal tables read top to bottom.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ConfigError;

use super::value::ParamValue;

/// An immutable, validated set of input variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

/// Builder for [`ParameterSet`].
#[derive(Debug, Default)]
pub struct ParameterSetBuilder {
    entries: Vec<(String, Node)>,
}

/// Builder for a nested mapping value.
#[derive(Debug, Default, Clone)]
pub struct MapBuilder {
    entries: Vec<(String, Node)>,
}

#[derive(Debug, Clone)]
enum Node {
    Value(ParamValue),
    Map(MapBuilder),
    Maps(Vec<MapBuilder>),
}

impl ParameterSet {
    /// Starts building a parameter set.
    #[must_use]
    pub fn builder() -> ParameterSetBuilder {
        ParameterSetBuilder::default()
    }

    /// Converts the `vars` mapping of a suite scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is empty or collides, or a value cannot be
    /// represented.
    pub fn from_yaml(mapping: &serde_yaml::Mapping) -> Result<Self, ConfigError> {
        match ParamValue::from_yaml("vars", &serde_yaml::Value::Mapping(mapping.clone()))? {
            ParamValue::Map(values) => Ok(Self { values }),
            _ => Err(ConfigError::UnsupportedValue {
                name: String::from("vars"),
                reason: String::from("expected a mapping"),
            }),
        }
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Returns true if the parameter is present (even if null).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns true if the parameter is present and truthy.
    #[must_use]
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(ParamValue::is_truthy)
    }

    /// Iterates parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders the set as a JSON object (the engine's variables payload).
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Returns a copy with one parameter replaced or added.
    #[must_use]
    pub fn with(&self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let mut values = self.values.clone();
        values.insert(name.into(), value.into());
        Self { values }
    }
}

impl ParameterSetBuilder {
    /// Adds a value (scalar or pre-built collection).
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.entries.push((name.into(), Node::Value(value.into())));
        self
    }

    /// Adds an ordered sequence of values.
    #[must_use]
    pub fn list<I, T>(mut self, name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ParamValue>,
    {
        let list = ParamValue::List(items.into_iter().map(Into::into).collect());
        self.entries.push((name.into(), Node::Value(list)));
        self
    }

    /// Adds a keyed mapping.
    #[must_use]
    pub fn map(mut self, name: impl Into<String>, map: MapBuilder) -> Self {
        self.entries.push((name.into(), Node::Map(map)));
        self
    }

    /// Adds an ordered sequence of mappings.
    #[must_use]
    pub fn maps(mut self, name: impl Into<String>, maps: Vec<MapBuilder>) -> Self {
        self.entries.push((name.into(), Node::Maps(maps)));
        self
    }

    /// Validates and freezes the set.
    ///
    /// # Errors
    ///
    /// Returns an error on empty or duplicate names at any nesting level.
    pub fn build(self) -> Result<ParameterSet, ConfigError> {
        let values = resolve_entries("parameter set", self.entries)?;
        Ok(ParameterSet { values })
    }
}

impl MapBuilder {
    /// Creates an empty mapping builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.entries.push((key.into(), Node::Value(value.into())));
        self
    }

    /// Adds a nested mapping.
    #[must_use]
    pub fn map(mut self, key: impl Into<String>, map: Self) -> Self {
        self.entries.push((key.into(), Node::Map(map)));
        self
    }

    /// Adds an ordered sequence of nested mappings.
    #[must_use]
    pub fn maps(mut self, key: impl Into<String>, maps: Vec<Self>) -> Self {
        self.entries.push((key.into(), Node::Maps(maps)));
        self
    }

    /// Validates the mapping into a value.
    ///
    /// # Errors
    ///
    /// Returns an error on empty or duplicate keys.
    pub fn build(self) -> Result<ParamValue, ConfigError> {
        resolve_entries("mapping", self.entries).map(ParamValue::Map)
    }
}

fn resolve_entries(
    context: &str,
    entries: Vec<(String, Node)>,
) -> Result<BTreeMap<String, ParamValue>, ConfigError> {
    let mut values = BTreeMap::new();

    for (key, node) in entries {
        if key.is_empty() {
            return Err(ConfigError::EmptyKey {
                context: context.to_string(),
            });
        }
        let nested = format!("{context}.{key}");
        let value = match node {
            Node::Value(value) => value,
            Node::Map(map) => ParamValue::Map(resolve_entries(&nested, map.entries)?),
            Node::Maps(maps) => ParamValue::List(
                maps.into_iter()
                    .enumerate()
                    .map(|(i, map)| {
                        resolve_entries(&format!("{nested}[{i}]"), map.entries).map(ParamValue::Map)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        if values.contains_key(&key) {
            return Err(ConfigError::DuplicateKey {
                key,
                context: context.to_string(),
            });
        }
        values.insert(key, value);
    }

    Ok(values)
}
