//! Scaling policies and their process-wide registry.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;

use sigma_node::NodeState;
use sigma_proto::Urn;

use crate::error::{Result, ScaleError};

/// Direction of a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    /// Leave the node count unchanged.
    Nop,
    /// Add nodes.
    Up,
    /// Remove nodes.
    Down,
}

/// A single policy's suggestion for one control-loop tick.
///
/// When `absolute` is false the amount is a percentage of the currently
/// running node count; the autoscaler resolves it before comparing
/// suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Suggested direction.
    pub direction: ScaleDirection,
    /// Suggested amount, absolute or percentage.
    pub amount: usize,
    /// Whether `amount` is an absolute node count.
    pub absolute: bool,
}

impl PolicyDecision {
    /// Suggests no change.
    #[must_use]
    pub const fn nop() -> Self {
        Self {
            direction: ScaleDirection::Nop,
            amount: 0,
            absolute: true,
        }
    }

    /// Suggests adding `amount` nodes.
    #[must_use]
    pub const fn up(amount: usize) -> Self {
        Self {
            direction: ScaleDirection::Up,
            amount,
            absolute: true,
        }
    }

    /// Suggests removing `amount` nodes.
    #[must_use]
    pub const fn down(amount: usize) -> Self {
        Self {
            direction: ScaleDirection::Down,
            amount,
            absolute: true,
        }
    }

    /// Suggests growing by a percentage of the running node count.
    #[must_use]
    pub const fn up_percent(percent: usize) -> Self {
        Self {
            direction: ScaleDirection::Up,
            amount: percent,
            absolute: false,
        }
    }

    /// Suggests shrinking by a percentage of the running node count.
    #[must_use]
    pub const fn down_percent(percent: usize) -> Self {
        Self {
            direction: ScaleDirection::Down,
            amount: percent,
            absolute: false,
        }
    }
}

/// Decides whether a function should be scaled up or down.
pub trait Policy: Send + Sync {
    /// Checks the current metric values and node states.
    fn check(
        &self,
        metrics: &HashMap<String, f64>,
        states: &HashMap<Urn, NodeState>,
    ) -> PolicyDecision;
}

/// Builds a policy from its option map.
pub type PolicyFactory = Box<dyn Fn(&HashMap<String, String>) -> Result<Box<dyn Policy>> + Send + Sync>;

/// Registry of named policy factories.
///
/// Production code uses the [`global`](Self::global) registry, populated
/// explicitly at startup; tests may build their own.
#[derive(Default)]
pub struct PolicyRegistry {
    factories: RwLock<HashMap<String, PolicyFactory>>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: LazyLock<PolicyRegistry> = LazyLock::new(PolicyRegistry::new);
        &GLOBAL
    }

    /// Registers a factory under a unique name.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken; duplicate registration is a
    /// programming error.
    pub fn register(&self, name: impl Into<String>, factory: PolicyFactory) {
        let name = name.into();
        let mut factories = self.factories.write();
        assert!(
            !factories.contains_key(&name),
            "scaling policy factory {name:?} already registered"
        );
        factories.insert(name, factory);
    }

    /// Builds the policy registered under `name` with the given options.
    pub fn build(&self, name: &str, options: &HashMap<String, String>) -> Result<Box<dyn Policy>> {
        let factories = self.factories.read();
        let factory = factories
            .get(name)
            .ok_or_else(|| ScaleError::UnknownPolicy(name.to_owned()))?;
        factory(options)
    }

    /// Returns true if a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Clears all registered factories. Intended for tests.
    pub fn reset(&self) {
        self.factories.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_build() {
        let registry = PolicyRegistry::new();
        registry.register(
            "noop",
            Box::new(|_options| {
                Ok(Box::new(NopPolicy) as Box<dyn Policy>)
            }),
        );

        assert!(registry.contains("noop"));
        let policy = registry.build("noop", &HashMap::new()).unwrap();
        assert_eq!(
            policy.check(&HashMap::new(), &HashMap::new()),
            PolicyDecision::nop()
        );

        assert!(matches!(
            registry.build("missing", &HashMap::new()),
            Err(ScaleError::UnknownPolicy(_))
        ));

        registry.reset();
        assert!(!registry.contains("noop"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let registry = PolicyRegistry::new();
        registry.register("dup", Box::new(|_| Ok(Box::new(NopPolicy) as Box<dyn Policy>)));
        registry.register("dup", Box::new(|_| Ok(Box::new(NopPolicy) as Box<dyn Policy>)));
    }

    struct NopPolicy;

    impl Policy for NopPolicy {
        fn check(
            &self,
            _metrics: &HashMap<String, f64>,
            _states: &HashMap<Urn, NodeState>,
        ) -> PolicyDecision {
            PolicyDecision::nop()
        }
    }
}
