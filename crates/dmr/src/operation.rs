//! Management operations and composite (batched) operations.

use crate::ModelNode;
use crate::address::Address;
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Key holding the operation name.
pub const OP: &str = "operation";
/// Key holding the target address.
pub const OP_ADDR: &str = "address";
/// Key holding the steps of a composite operation.
pub const STEPS: &str = "steps";
/// Name of the composite operation.
pub const COMPOSITE: &str = "composite";

/// A single management request: name, target address and named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    address: Address,
    params: Map<String, Value>,
}

impl Operation {
    /// Create an operation with no parameters.
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
            params: Map::new(),
        }
    }

    /// Set a parameter (builder style).
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(key, value);
        self
    }

    /// Set a parameter in place.
    ///
    /// `operation` and `address` are not parameters; setting either is
    /// ignored, as the name and address are fixed at construction.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key != OP && key != OP_ADDR {
            self.params.insert(key, value.into());
        }
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Named parameters, sorted by key.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Look up a single parameter.
    pub fn get_param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Whether this is a composite operation.
    pub fn is_composite(&self) -> bool {
        self.name == COMPOSITE
    }

    /// Encode as a model node.
    pub fn to_model(&self) -> ModelNode {
        let mut node = self.params.clone();
        node.insert(OP.to_string(), Value::String(self.name.clone()));
        node.insert(OP_ADDR.to_string(), self.address.to_model());
        Value::Object(node)
    }

    /// Decode from a model node. The `operation` key must be a non-empty string.
    pub fn from_model(node: &ModelNode) -> Result<Self> {
        let map = node
            .as_object()
            .ok_or_else(|| Error::InvalidOperation(format!("expected an object, got {}", node)))?;
        let name = match map.get(OP) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(_) => {
                return Err(Error::InvalidOperation(
                    "'operation' must be a non-empty string".to_string(),
                ));
            }
            None => return Err(Error::InvalidOperation("missing 'operation'".to_string())),
        };
        let address = match map.get(OP_ADDR) {
            Some(addr) => Address::from_model(addr)?,
            None => Address::root(),
        };
        let params = map
            .iter()
            .filter(|(k, _)| k.as_str() != OP && k.as_str() != OP_ADDR)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            name,
            address,
            params,
        })
    }

    /// Parse an operation from its JSON text form.
    pub fn parse(text: &str) -> Result<Self> {
        let node: Value = serde_json::from_str(text)?;
        Self::from_model(&node)
    }

    /// Compact single-line JSON encoding.
    pub fn to_json_line(&self) -> String {
        self.to_model().to_string()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.address.is_root() {
            write!(f, "{}", self.address)?;
        }
        write!(f, ":{}", self.name)?;
        if self.params.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect();
        write!(f, "({})", rendered.join(","))
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_model().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let node = Value::deserialize(deserializer)?;
        Self::from_model(&node).map_err(serde::de::Error::custom)
    }
}

/// Ordered steps submitted atomically as one `composite` operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    steps: Vec<Operation>,
}

impl Composite {
    /// Create an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn add_step(&mut self, step: Operation) {
        self.steps.push(step);
    }

    /// The steps, in submission order.
    pub fn steps(&self) -> &[Operation] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps were added.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Build the `composite` operation at the root address.
    pub fn to_operation(&self) -> Operation {
        let steps = self.steps.iter().map(Operation::to_model).collect();
        Operation::new(COMPOSITE, Address::root()).param(STEPS, Value::Array(steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_model() {
        let op = Operation::new("add", Address::root().child("subsystem", "x")).param("a", 1);
        assert_eq!(
            op.to_model(),
            json!({"operation": "add", "address": [{"subsystem": "x"}], "a": 1})
        );
    }

    #[test]
    fn test_reserved_keys_are_not_parameters() {
        let target = Address::root().child("subsystem", "x");
        let op = Operation::new("write-attribute", target.clone())
            .param("address", "/subsystem=other")
            .param("operation", "remove")
            .param("name", "enabled");
        assert_eq!(op.params().len(), 1);
        let model = op.to_model();
        assert_eq!(model["operation"], json!("write-attribute"));
        assert_eq!(model["address"], target.to_model());
        assert_eq!(Operation::from_model(&model).unwrap(), op);
    }

    #[test]
    fn test_params_are_sorted_by_key() {
        let op = Operation::new("add", Address::root()).param("zeta", 1).param("alpha", 2);
        let keys: Vec<_> = op.params().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_parse_text() {
        let op = Operation::parse(
            r#"{"operation":"write-attribute","address":[{"interface":"public"}],"name":"inet-address","value":"127.0.0.1"}"#,
        )
        .unwrap();
        assert_eq!(op.name(), "write-attribute");
        assert_eq!(op.address().value_of("interface"), Some("public"));
        assert_eq!(op.get_param("value"), Some(&json!("127.0.0.1")));
    }

    #[test]
    fn test_parse_requires_name() {
        assert!(Operation::parse(r#"{"address":[]}"#).is_err());
        assert!(Operation::parse(r#"{"operation":""}"#).is_err());
        assert!(Operation::parse(r#"{"operation":7}"#).is_err());
        assert!(Operation::parse("[1,2]").is_err());
        assert!(Operation::parse("not json").is_err());
    }

    #[test]
    fn test_missing_address_is_root() {
        let op = Operation::parse(r#"{"operation":"read-resource"}"#).unwrap();
        assert!(op.address().is_root());
    }

    #[test]
    fn test_json_line_is_single_line() {
        let op = Operation::new("add", Address::root().child("subsystem", "x"))
            .param("value", "multi\nline");
        let line = op.to_json_line();
        assert!(!line.contains('\n'));
        assert_eq!(Operation::parse(&line).unwrap(), op);
    }

    #[test]
    fn test_display() {
        let op = Operation::new("add", Address::root().child("subsystem", "x"));
        assert_eq!(op.to_string(), "/subsystem=x:add");
        let op = Operation::new("read-children-names", Address::root()).param("child-type", "host");
        assert_eq!(op.to_string(), ":read-children-names(child-type=host)");
    }

    #[test]
    fn test_composite() {
        let mut composite = Composite::new();
        assert!(composite.is_empty());
        composite.add_step(Operation::new("add", Address::root().child("subsystem", "a")));
        composite.add_step(Operation::new("add", Address::root().child("subsystem", "b")));

        let op = composite.to_operation();
        assert!(op.is_composite());
        let steps = op.get_param(STEPS).unwrap().as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1]["address"], json!([{"subsystem": "b"}]));
    }

    #[test]
    fn test_empty_composite_has_empty_steps() {
        let op = Composite::new().to_operation();
        assert_eq!(op.get_param(STEPS), Some(&json!([])));
    }

    #[test]
    fn test_serde() {
        let op: Operation =
            serde_json::from_value(json!({"operation": "remove", "address": "/subsystem=x"}))
                .unwrap();
        assert_eq!(op.address().value_of("subsystem"), Some("x"));
        let back = serde_json::to_value(&op).unwrap();
        assert_eq!(back["address"], json!([{"subsystem": "x"}]));
    }
}
