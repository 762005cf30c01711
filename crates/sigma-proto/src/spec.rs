//! Function and trigger descriptor types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Declarative description of a function managed by Sigma.
///
/// Specs are immutable once submitted; the scheduler and function
/// controllers only ever read them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Stable function identifier.
    pub id: String,

    /// Execution type, used by the launcher to select a worker runtime.
    #[serde(rename = "type")]
    pub runtime: String,

    /// Opaque function code blob.
    #[serde(default)]
    pub content: Vec<u8>,

    /// Trigger specifications, in declaration order.
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,

    /// Autoscale policy name → policy options.
    #[serde(default)]
    pub policies: HashMap<String, HashMap<String, String>>,

    /// Optional function parameters.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Declarative description of a function trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Trigger type to build.
    #[serde(rename = "type")]
    pub trigger_type: String,

    /// Predicate expression evaluated against each event before dispatch.
    #[serde(rename = "when", default)]
    pub condition: String,

    /// Additional options handed to the trigger builder.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Converts a parameter map to its wire representation.
///
/// The wire format uses ordered pairs rather than a map; pairs are sorted
/// by key so the encoding is deterministic.
#[must_use]
pub fn parameters_to_wire(parameters: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    pairs.sort();
    pairs
}

/// Converts wire parameter pairs back into a map.
///
/// Later duplicate keys win, mirroring map insertion order.
#[must_use]
pub fn parameters_from_wire(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_wire_roundtrip() {
        let mut parameters = HashMap::new();
        parameters.insert("region".to_owned(), "eu-west-1".to_owned());
        parameters.insert("alpha".to_owned(), "1".to_owned());

        let wire = parameters_to_wire(&parameters);
        assert_eq!(wire[0].0, "alpha");
        assert_eq!(wire[1].0, "region");

        let restored = parameters_from_wire(wire);
        assert_eq!(restored, parameters);
    }

    #[test]
    fn spec_deserialises_from_json() {
        let json = r#"{
            "id": "greet",
            "type": "nodejs",
            "triggers": [{"type": "channel", "when": "sensor.reading"}],
            "policies": {"static-count": {"count": "2"}}
        }"#;

        let spec: FunctionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.id, "greet");
        assert_eq!(spec.runtime, "nodejs");
        assert_eq!(spec.triggers.len(), 1);
        assert_eq!(spec.triggers[0].condition, "sensor.reading");
        assert!(spec.policies.contains_key("static-count"));
        assert!(spec.content.is_empty());
    }
}
