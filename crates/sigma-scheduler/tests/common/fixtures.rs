//! Builders for test function specs.

use std::collections::HashMap;

use sigma_proto::{FunctionSpec, TriggerSpec};

/// Builder for test [`FunctionSpec`] instances.
pub struct SpecBuilder {
    spec: FunctionSpec,
}

impl SpecBuilder {
    /// Creates a spec builder with the given function id.
    pub fn new(id: &str) -> Self {
        Self {
            spec: FunctionSpec {
                id: id.to_owned(),
                runtime: "test".to_owned(),
                content: b"function code".to_vec(),
                ..FunctionSpec::default()
            },
        }
    }

    /// Sets the execution type.
    #[allow(dead_code)]
    pub fn runtime(mut self, runtime: &str) -> Self {
        self.spec.runtime = runtime.to_owned();
        self
    }

    /// Attaches an autoscale policy with options.
    pub fn policy(mut self, name: &str, options: &[(&str, &str)]) -> Self {
        let options: HashMap<String, String> = options
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        self.spec.policies.insert(name.to_owned(), options);
        self
    }

    /// Adds a trigger spec.
    #[allow(dead_code)]
    pub fn trigger(mut self, trigger_type: &str, condition: &str) -> Self {
        self.spec.triggers.push(TriggerSpec {
            trigger_type: trigger_type.to_owned(),
            condition: condition.to_owned(),
            options: HashMap::new(),
        });
        self
    }

    /// Sets a function parameter.
    #[allow(dead_code)]
    pub fn parameter(mut self, key: &str, value: &str) -> Self {
        self.spec
            .parameters
            .insert(key.to_owned(), value.to_owned());
        self
    }

    /// Builds the spec.
    pub fn build(self) -> FunctionSpec {
        self.spec
    }
}
