//! Policy composition into a single scaling decision.

use std::collections::HashMap;

use parking_lot::RwLock;

use sigma_node::NodeState;
use sigma_proto::Urn;

use crate::error::{Result, ScaleError};
use crate::policy::{Policy, PolicyDecision, PolicyRegistry, ScaleDirection};

/// Name reported when the built-in minimum-availability rule fires.
pub const BUILTIN_POLICY: &str = "built-in";

/// The composed decision for one control-loop tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleDecision {
    /// Name of the policy whose suggestion was selected, if any.
    pub policy: Option<String>,
    /// Selected direction.
    pub direction: ScaleDirection,
    /// Number of nodes to add or remove.
    pub amount: usize,
}

impl ScaleDecision {
    const fn nop() -> Self {
        Self {
            policy: None,
            direction: ScaleDirection::Nop,
            amount: 0,
        }
    }
}

/// Composes attached scaling policies into one decision per tick.
///
/// Relative suggestions are resolved against the running node count, then
/// the suggestion with the most positive impact wins: the largest scale-up
/// if any policy wants to grow, otherwise the smallest scale-down. With no
/// policies attached, a built-in rule keeps at least one node available.
#[derive(Default)]
pub struct AutoScaler {
    policies: RwLock<HashMap<String, Box<dyn Policy>>>,
}

impl AutoScaler {
    /// Creates an autoscaler with no attached policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an autoscaler from a spec's policy map using the registry.
    pub fn from_spec(
        policies: &HashMap<String, HashMap<String, String>>,
        registry: &PolicyRegistry,
    ) -> Result<Self> {
        let scaler = Self::new();
        for (name, options) in policies {
            let policy = registry.build(name, options)?;
            scaler.attach(name.clone(), policy)?;
        }
        Ok(scaler)
    }

    /// Attaches a policy under a unique name.
    pub fn attach(&self, name: impl Into<String>, policy: Box<dyn Policy>) -> Result<()> {
        let name = name.into();
        let mut policies = self.policies.write();
        if policies.contains_key(&name) {
            return Err(ScaleError::AlreadyAttached(name));
        }
        policies.insert(name, policy);
        Ok(())
    }

    /// Detaches the policy registered under `name`.
    pub fn detach(&self, name: &str) -> Result<()> {
        if self.policies.write().remove(name).is_none() {
            return Err(ScaleError::NotFound(name.to_owned()));
        }
        Ok(())
    }

    /// Composes all attached policies into one decision.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::as_conversions)]
    pub fn check(
        &self,
        metrics: &HashMap<String, f64>,
        states: &HashMap<Urn, NodeState>,
    ) -> ScaleDecision {
        let policies = self.policies.read();
        let running = states.len();

        if policies.is_empty() {
            let available = states
                .values()
                .filter(|state| matches!(state, NodeState::Active | NodeState::Running))
                .count();

            if available == 0 {
                return ScaleDecision {
                    policy: Some(BUILTIN_POLICY.to_owned()),
                    direction: ScaleDirection::Up,
                    amount: 1,
                };
            }
            return ScaleDecision::nop();
        }

        let mut decision = ScaleDecision::nop();

        for (name, policy) in policies.iter() {
            let PolicyDecision {
                direction,
                amount,
                absolute,
            } = policy.check(metrics, states);

            let amount = if absolute {
                amount
            } else {
                ((amount as f64 / 100.0) * running as f64) as usize
            };

            match (direction, decision.direction) {
                (ScaleDirection::Up, ScaleDirection::Up) => {
                    if amount > decision.amount {
                        decision.amount = amount;
                        decision.policy = Some(name.clone());
                    }
                }
                (ScaleDirection::Up, _) => {
                    decision.direction = ScaleDirection::Up;
                    decision.amount = amount;
                    decision.policy = Some(name.clone());
                }
                (ScaleDirection::Down, ScaleDirection::Down) => {
                    if amount < decision.amount {
                        decision.amount = amount;
                        decision.policy = Some(name.clone());
                    }
                }
                (ScaleDirection::Down, ScaleDirection::Nop) => {
                    decision.direction = ScaleDirection::Down;
                    decision.amount = amount;
                    decision.policy = Some(name.clone());
                }
                // A scale-up suggestion always dominates scale-down.
                (ScaleDirection::Down, ScaleDirection::Up) | (ScaleDirection::Nop, _) => {}
            }
        }

        decision
    }
}
