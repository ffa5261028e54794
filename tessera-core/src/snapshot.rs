//! State snapshots handed to renderers.
//!
//! A snapshot is taken between microcycles, so every value in it belongs to
//! one consistent settled state. Serialization is JSON for debugging and
//! MessagePack for transport.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::value::Value;

/// Public state variables of every live component, keyed by component name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Microcycle the snapshot was taken after.
    pub cycle: u64,
    pub components: IndexMap<String, IndexMap<String, Value>>,
}

impl StateSnapshot {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            components: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, component: impl Into<String>, variables: IndexMap<String, Value>) {
        self.components.insert(component.into(), variables);
    }

    pub fn get(&self, component: &str, variable: &str) -> Option<&Value> {
        self.components.get(component)?.get(variable)
    }

    /// All variables of one component.
    pub fn component(&self, component: &str) -> Option<&IndexMap<String, Value>> {
        self.components.get(component)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// MessagePack with field names, so renderers can decode it without
    /// a schema.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateSnapshot {
        let mut snapshot = StateSnapshot::new(3);
        let mut point = IndexMap::new();
        point.insert("x".to_string(), Value::Number(1.5));
        point.insert(
            "coords".to_string(),
            Value::Tuple(vec![Value::Number(1.5), Value::Number(-2.0)]),
        );
        snapshot.insert("P", point);
        let mut input = IndexMap::new();
        input.insert("value".to_string(), Value::Invalid);
        snapshot.insert("mi", input);
        snapshot
    }

    #[test]
    fn lookup_by_component_and_variable() {
        let snapshot = sample();
        assert_eq!(snapshot.get("P", "x"), Some(&Value::Number(1.5)));
        assert_eq!(snapshot.get("P", "y"), None);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn json_keeps_component_order_and_invalid_values() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        assert!(json.find("\"P\"").unwrap() < json.find("\"mi\"").unwrap());
        assert_eq!(StateSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn msgpack_is_not_empty() {
        let bytes = sample().to_msgpack().unwrap();
        assert!(!bytes.is_empty());
    }
}
