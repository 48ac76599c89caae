//! Parameter values.
//!
//! A value is a scalar, an ordered sequence of values, or a mapping from
//! string keys to values. This mirrors what a planning engine accepts as an
//! input variable.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Number, Value};

use crate::error::ConfigError;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar.
    Number(Number),
    /// String scalar.
    String(String),
    /// Ordered sequence.
    List(Vec<ParamValue>),
    /// Keyed mapping.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Creates a float value, or `None` for NaN and infinities.
    #[must_use]
    pub fn float(value: f64) -> Option<Self> {
        Number::from_f64(value).map(Self::Number)
    }

    /// Returns the value as a string slice if it is a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the mapping if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Interprets the value as a feature flag.
    ///
    /// `true`, non-zero numbers, the strings `"true"`/`"1"`/`"yes"` and
    /// non-empty collections are truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Self::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    /// Renders the value as JSON for the engine's variables payload.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Converts a YAML value from a suite file.
    ///
    /// # Errors
    ///
    /// Returns an error for non-scalar mapping keys, keys that collide after
    /// conversion to strings, or non-finite floats.
    pub fn from_yaml(context: &str, value: &serde_yaml::Value) -> Result<Self, ConfigError> {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Null => Ok(Self::Null),
            Yaml::Bool(b) => Ok(Self::Bool(*b)),
            Yaml::Number(n) => yaml_number(context, n),
            Yaml::String(s) => Ok(Self::String(s.clone())),
            Yaml::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Self::from_yaml(&format!("{context}[{i}]"), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Yaml::Mapping(mapping) => {
                let mut entries = BTreeMap::new();
                for (key, item) in mapping {
                    let key = yaml_key(context, key)?;
                    if key.is_empty() {
                        return Err(ConfigError::EmptyKey {
                            context: context.to_string(),
                        });
                    }
                    let converted = Self::from_yaml(&format!("{context}.{key}"), item)?;
                    if entries.insert(key.clone(), converted).is_some() {
                        return Err(ConfigError::DuplicateKey {
                            key,
                            context: context.to_string(),
                        });
                    }
                }
                Ok(Self::Map(entries))
            }
            Yaml::Tagged(tagged) => Self::from_yaml(context, &tagged.value),
        }
    }
}

fn yaml_number(context: &str, n: &serde_yaml::Number) -> Result<ParamValue, ConfigError> {
    if let Some(i) = n.as_i64() {
        return Ok(ParamValue::Number(Number::from(i)));
    }
    if let Some(u) = n.as_u64() {
        return Ok(ParamValue::Number(Number::from(u)));
    }
    n.as_f64()
        .and_then(ParamValue::float)
        .ok_or_else(|| ConfigError::UnsupportedValue {
            name: context.to_string(),
            reason: String::from("non-finite number"),
        })
}

fn yaml_key(context: &str, key: &serde_yaml::Value) -> Result<String, ConfigError> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(n) => Ok(n.to_string()),
        _ => Err(ConfigError::UnsupportedValue {
            name: context.to_string(),
            reason: String::from("mapping keys must be scalars"),
        }),
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl<T: Into<Self>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(ParamValue::from(true).is_truthy());
        assert!(!ParamValue::from(false).is_truthy());
        assert!(ParamValue::from("true").is_truthy());
        assert!(!ParamValue::from("false").is_truthy());
        assert!(!ParamValue::Null.is_truthy());
        assert!(!ParamValue::Map(BTreeMap::new()).is_truthy());
        assert!(ParamValue::from(vec!["EnableServerless"]).is_truthy());
    }

    #[test]
    fn test_from_yaml_nested() {
        let yaml: serde_yaml::Value = serde_yaml::from_str(
            r"
- location: westeurope
  failover_priority: 0
  zone_redundant: true
- location: northeurope
  failover_priority: 1
",
        )
        .unwrap();

        let value = ParamValue::from_yaml("geo_locations", &yaml).unwrap();
        let ParamValue::List(items) = &value else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 2);
        let first = items[0].as_map().unwrap();
        assert_eq!(first["location"], ParamValue::from("westeurope"));
        assert_eq!(first["failover_priority"], ParamValue::from(0));
    }

    #[test]
    fn test_from_yaml_rejects_colliding_keys() {
        let mut mapping = serde_yaml::Mapping::new();
        mapping.insert(serde_yaml::Value::from(1), serde_yaml::Value::from("a"));
        mapping.insert(serde_yaml::Value::from("1"), serde_yaml::Value::from("b"));

        let err = ParamValue::from_yaml("vars", &serde_yaml::Value::Mapping(mapping)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey { ref key, .. } if key == "1"));
    }

    #[test]
    fn test_to_json_shape() {
        let value = ParamValue::from(vec![ParamValue::from("_id")]);
        assert_eq!(value.to_json(), serde_json::json!(["_id"]));
        assert_eq!(ParamValue::from("prod").to_string(), "prod");
    }
}
