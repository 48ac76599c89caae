//! Attribute paths into a resource snapshot.
//!
//! Paths are dotted, with optional bracket segments:
//! `name`, `geo_location[0].location`, `tags["env"]`, `geo_location.*.location`.
//! A numeric dotted segment indexes into arrays; `*` matches every element of
//! an array or every value of an object.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributePath {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Any,
}

impl AttributePath {
    /// Parses a path.
    ///
    /// # Errors
    ///
    /// Returns an error for empty paths, empty segments, unterminated
    /// brackets or quotes, and bracket contents that are neither an index,
    /// a quoted key, nor `*`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::validation(format!("Invalid attribute path '{raw}': {reason}"), "path");

        if raw.trim().is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;
        let mut current = String::new();
        // True right after a closing bracket, where only '.', '[' or the end may follow.
        let mut after_bracket = false;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    if current.is_empty() && !after_bracket {
                        return Err(invalid("empty segment"));
                    }
                    if !current.is_empty() {
                        segments.push(bare_segment(&current));
                        current.clear();
                    }
                    after_bracket = false;
                    i += 1;
                    if i == chars.len() {
                        return Err(invalid("trailing '.'"));
                    }
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(bare_segment(&current));
                        current.clear();
                    } else if segments.is_empty() {
                        return Err(invalid("path cannot start with '['"));
                    }
                    let (segment, next) = bracket_segment(&chars, i + 1).ok_or_else(|| invalid("malformed bracket segment"))?;
                    segments.push(segment);
                    after_bracket = true;
                    i = next;
                }
                ch => {
                    if after_bracket {
                        return Err(invalid("expected '.' or '[' after ']'"));
                    }
                    current.push(ch);
                    i += 1;
                }
            }
        }
        if !current.is_empty() {
            segments.push(bare_segment(&current));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolves the path against a snapshot, returning every matched value.
    ///
    /// An empty result means the path does not resolve.
    #[must_use]
    pub fn resolve<'a>(&self, root: &'a Map<String, Value>) -> Vec<&'a Value> {
        let mut frontier: Vec<&Value> = Vec::new();
        let Some((first, rest)) = self.segments.split_first() else {
            return frontier;
        };

        match first {
            Segment::Key(key) => frontier.extend(root.get(key)),
            Segment::Any => frontier.extend(root.values()),
            Segment::Index(_) => return frontier,
        }

        for segment in rest {
            frontier = frontier
                .into_iter()
                .flat_map(|value| step(value, segment))
                .collect();
            if frontier.is_empty() {
                break;
            }
        }
        frontier
    }
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Vec<&'a Value> {
    match (segment, value) {
        (Segment::Key(key), Value::Object(map)) => map.get(key).into_iter().collect(),
        (Segment::Key(key), Value::Array(items)) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .into_iter()
            .collect(),
        (Segment::Index(i), Value::Array(items)) => items.get(*i).into_iter().collect(),
        (Segment::Any, Value::Array(items)) => items.iter().collect(),
        (Segment::Any, Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn bare_segment(text: &str) -> Segment {
    if text == "*" {
        Segment::Any
    } else {
        Segment::Key(text.to_string())
    }
}

/// Parses the inside of `[...]` starting at `start`; returns the segment and
/// the position after the closing bracket.
fn bracket_segment(chars: &[char], start: usize) -> Option<(Segment, usize)> {
    if chars.get(start) == Some(&'"') {
        let mut key = String::new();
        let mut i = start + 1;
        loop {
            match chars.get(i)? {
                '\\' => {
                    key.push(*chars.get(i + 1)?);
                    i += 2;
                }
                '"' => break,
                ch => {
                    key.push(*ch);
                    i += 1;
                }
            }
        }
        return (chars.get(i + 1) == Some(&']')).then_some((Segment::Key(key), i + 2));
    }

    let end = start + chars[start..].iter().position(|&c| c == ']')?;
    let inner: String = chars[start..end].iter().collect();
    let segment = match inner.trim() {
        "*" => Segment::Any,
        digits => Segment::Index(digits.parse().ok()?),
    };
    Some((segment, end + 1))
}

impl TryFrom<String> for AttributePath {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AttributePath> for String {
    fn from(path: AttributePath) -> Self {
        path.raw
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Map<String, Value> {
        json!({
            "name": "cosmos-prod-westeurope",
            "geo_location": [
                { "location": "westeurope", "failover_priority": 0 },
                { "location": "northeurope", "failover_priority": 1 }
            ],
            "tags": { "env": "prod", "team.name": "data" }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn strings(path: &str) -> Vec<String> {
        let snapshot = snapshot();
        AttributePath::parse(path)
            .unwrap()
            .resolve(&snapshot)
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_resolve_forms() {
        assert_eq!(strings("name"), vec![r#""cosmos-prod-westeurope""#]);
        assert_eq!(strings("geo_location[1].location"), vec![r#""northeurope""#]);
        assert_eq!(strings("geo_location.0.location"), vec![r#""westeurope""#]);
        assert_eq!(strings(r#"tags["team.name"]"#), vec![r#""data""#]);
        assert_eq!(strings("geo_location.*.location").len(), 2);
        assert_eq!(strings("geo_location[*].failover_priority"), vec!["0", "1"]);
    }

    #[test]
    fn test_unresolved_paths_are_empty() {
        assert!(strings("kind").is_empty());
        assert!(strings("geo_location[5].location").is_empty());
        assert!(strings("name.first").is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a..b", "a.", "[0]", "a[", "a[x]", r#"a["k"#, "a[0]b"] {
            assert!(AttributePath::parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn test_deserialize_from_string() {
        let path: AttributePath = serde_yaml::from_str("geo_location.*.location").unwrap();
        assert_eq!(path.as_str(), "geo_location.*.location");
        assert!(serde_yaml::from_str::<AttributePath>("a..b").is_err());
    }
}
