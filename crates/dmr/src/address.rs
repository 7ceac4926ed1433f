//! Ordered resource addresses.
//!
//! An address is a path of `type=name` segments from the model root, e.g.
//! `/subsystem=logging/console-handler=CONSOLE`. Segment order is significant.

use crate::ModelNode;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Address of a management resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    segments: Vec<(String, String)>,
}

impl Address {
    /// The root resource.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build an address from `(type, name)` pairs.
    pub fn from_pairs<I, T, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, N)>,
        T: Into<String>,
        N: Into<String>,
    {
        Self {
            segments: pairs
                .into_iter()
                .map(|(t, n)| (t.into(), n.into()))
                .collect(),
        }
    }

    /// Return a copy of this address with one more segment appended.
    #[must_use]
    pub fn child(mut self, resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        self.segments.push((resource_type.into(), name.into()));
        self
    }

    /// The `(type, name)` segments, outermost first.
    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }

    /// Whether this is the root address.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the first segment with the given type.
    pub fn value_of(&self, resource_type: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(t, _)| t == resource_type)
            .map(|(_, n)| n.as_str())
    }

    /// Parse the CLI path form: `/type=name/type=name`. `/` and `` are the root.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let mut segments = Vec::new();
        for part in trimmed.split('/').filter(|p| !p.is_empty()) {
            let (t, n) = part.split_once('=').ok_or_else(|| Error::InvalidAddress {
                input: input.to_string(),
                reason: format!("segment '{}' is not type=name", part),
            })?;
            if t.is_empty() || n.is_empty() {
                return Err(Error::InvalidAddress {
                    input: input.to_string(),
                    reason: format!("segment '{}' has an empty type or name", part),
                });
            }
            segments.push((t.to_string(), n.to_string()));
        }
        Ok(Self { segments })
    }

    /// Encode as the JSON list form: `[{"type": "name"}, ...]`.
    pub fn to_model(&self) -> ModelNode {
        Value::Array(
            self.segments
                .iter()
                .map(|(t, n)| {
                    let mut segment = Map::new();
                    segment.insert(t.clone(), Value::String(n.clone()));
                    Value::Object(segment)
                })
                .collect(),
        )
    }

    /// Decode the JSON list form.
    ///
    /// Accepts single-entry objects (`{"subsystem": "x"}`), two-element
    /// arrays (`["subsystem", "x"]`), an undefined node (root) or the CLI
    /// path string.
    pub fn from_model(node: &ModelNode) -> Result<Self> {
        match node {
            Value::Null => Ok(Self::root()),
            Value::String(path) => Self::parse(path),
            Value::Array(items) => {
                let mut segments = Vec::with_capacity(items.len());
                for item in items {
                    segments.push(segment_from_model(item)?);
                }
                Ok(Self { segments })
            }
            other => Err(Error::InvalidAddress {
                input: other.to_string(),
                reason: "expected a list of segments".to_string(),
            }),
        }
    }
}

fn segment_from_model(item: &Value) -> Result<(String, String)> {
    let invalid = |reason: &str| Error::InvalidAddress {
        input: item.to_string(),
        reason: reason.to_string(),
    };
    match item {
        Value::Object(map) if map.len() == 1 => {
            let (t, n) = map.iter().next().ok_or_else(|| invalid("empty segment"))?;
            let n = n
                .as_str()
                .ok_or_else(|| invalid("segment name must be a string"))?;
            Ok((t.clone(), n.to_string()))
        }
        Value::Array(pair) if pair.len() == 2 => match (&pair[0], &pair[1]) {
            (Value::String(t), Value::String(n)) => Ok((t.clone(), n.clone())),
            _ => Err(invalid("segment pair must hold two strings")),
        },
        _ => Err(invalid("segment must be a single-entry object")),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for (t, n) in &self.segments {
            write!(f, "/{}={}", t, n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path() {
        let addr = Address::parse("/subsystem=logging/console-handler=CONSOLE").unwrap();
        assert_eq!(addr.segments().len(), 2);
        assert_eq!(addr.value_of("console-handler"), Some("CONSOLE"));
        assert_eq!(addr.to_string(), "/subsystem=logging/console-handler=CONSOLE");
    }

    #[test]
    fn test_parse_root() {
        assert!(Address::parse("/").unwrap().is_root());
        assert!(Address::parse("").unwrap().is_root());
        assert_eq!(Address::root().to_string(), "/");
    }

    #[test]
    fn test_parse_rejects_bad_segment() {
        assert!(Address::parse("/subsystem").is_err());
        assert!(Address::parse("/=x").is_err());
    }

    #[test]
    fn test_model_keeps_order() {
        let addr = Address::root().child("host", "primary").child("subsystem", "jmx");
        let model = addr.to_model();
        assert_eq!(model, json!([{"host": "primary"}, {"subsystem": "jmx"}]));
        assert_eq!(Address::from_model(&model).unwrap(), addr);
    }

    #[test]
    fn test_from_model_pairs_and_null() {
        let addr = Address::from_model(&json!([["profile", "default"], ["subsystem", "ee"]]))
            .unwrap();
        assert_eq!(addr.to_string(), "/profile=default/subsystem=ee");
        assert!(Address::from_model(&Value::Null).unwrap().is_root());
    }

    #[test]
    fn test_from_model_rejects_non_list() {
        assert!(Address::from_model(&json!(42)).is_err());
        assert!(Address::from_model(&json!([{"a": "b", "c": "d"}])).is_err());
    }
}
