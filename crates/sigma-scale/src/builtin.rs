//! Built-in metrics and policies.

use std::collections::HashMap;
use std::sync::{Arc, Once};

use sigma_node::{NodeController, NodeState};
use sigma_proto::Urn;

use crate::error::{Result, ScaleError};
use crate::metrics::{Metric, MetricRegistry};
use crate::policy::{Policy, PolicyDecision, PolicyRegistry};

/// Metric name: number of selectable nodes.
pub const METRIC_ACTIVE_NODES: &str = "active-nodes";

/// Metric name: sum of invocations across all nodes.
pub const METRIC_TOTAL_INVOCATIONS: &str = "total-invocations";

/// Metric name: mean execution time across nodes, in milliseconds.
pub const METRIC_MEAN_EXEC_TIME_MS: &str = "mean-exec-time-ms";

/// Policy name: hold the node count at a fixed target.
pub const POLICY_STATIC_COUNT: &str = "static-count";

/// Registers the built-in metrics and policies in the global registries.
///
/// Safe to call more than once; only the first call registers.
pub fn register_builtins() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        register_builtin_metrics(MetricRegistry::global());
        register_builtin_policies(PolicyRegistry::global());
    });
}

/// Registers the built-in metrics into `registry`.
pub fn register_builtin_metrics(registry: &MetricRegistry) {
    registry.register(
        METRIC_ACTIVE_NODES,
        Box::new(|| Box::new(ActiveNodes) as Box<dyn Metric>),
    );
    registry.register(
        METRIC_TOTAL_INVOCATIONS,
        Box::new(|| Box::new(TotalInvocations) as Box<dyn Metric>),
    );
    registry.register(
        METRIC_MEAN_EXEC_TIME_MS,
        Box::new(|| Box::new(MeanExecTime) as Box<dyn Metric>),
    );
}

/// Registers the built-in policies into `registry`.
pub fn register_builtin_policies(registry: &PolicyRegistry) {
    registry.register(
        POLICY_STATIC_COUNT,
        Box::new(|options| StaticCount::from_options(options).map(|p| Box::new(p) as Box<dyn Policy>)),
    );
}

/// Counts nodes currently selectable for dispatch.
struct ActiveNodes;

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
impl Metric for ActiveNodes {
    fn update(&mut self, controllers: &HashMap<Urn, Arc<NodeController>>) -> f64 {
        controllers
            .values()
            .filter(|ctrl| ctrl.state().can_select())
            .count() as f64
    }
}

/// Sums invocation counts across all nodes.
struct TotalInvocations;

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
impl Metric for TotalInvocations {
    fn update(&mut self, controllers: &HashMap<Urn, Arc<NodeController>>) -> f64 {
        controllers
            .values()
            .map(|ctrl| ctrl.stats().invocations)
            .sum::<u64>() as f64
    }
}

/// Averages the per-node mean execution times, in milliseconds.
struct MeanExecTime;

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
impl Metric for MeanExecTime {
    fn update(&mut self, controllers: &HashMap<Urn, Arc<NodeController>>) -> f64 {
        let with_invocations: Vec<f64> = controllers
            .values()
            .map(|ctrl| ctrl.stats())
            .filter(|stats| stats.invocations > 0)
            .map(|stats| stats.mean_exec_time.as_secs_f64() * 1_000.0)
            .collect();

        if with_invocations.is_empty() {
            return 0.0;
        }
        with_invocations.iter().sum::<f64>() / with_invocations.len() as f64
    }
}

/// Holds the function at a fixed node count.
///
/// Options: `count` - the target number of nodes.
struct StaticCount {
    count: usize,
}

impl StaticCount {
    fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let raw = options
            .get("count")
            .ok_or_else(|| ScaleError::InvalidOption {
                policy: POLICY_STATIC_COUNT.to_owned(),
                option: "count".to_owned(),
                reason: "missing".to_owned(),
            })?;

        let count = raw.parse().map_err(|_| ScaleError::InvalidOption {
            policy: POLICY_STATIC_COUNT.to_owned(),
            option: "count".to_owned(),
            reason: format!("not a number: {raw}"),
        })?;

        Ok(Self { count })
    }
}

impl Policy for StaticCount {
    fn check(
        &self,
        _metrics: &HashMap<String, f64>,
        states: &HashMap<Urn, NodeState>,
    ) -> PolicyDecision {
        // Unhealthy nodes are reaped before the next check and do not
        // count toward the target.
        let live = states
            .values()
            .filter(|state| state.is_healthy())
            .count();

        match live.cmp(&self.count) {
            std::cmp::Ordering::Less => PolicyDecision::up(self.count - live),
            std::cmp::Ordering::Greater => PolicyDecision::down(live - self.count),
            std::cmp::Ordering::Equal => PolicyDecision::nop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ScaleDirection;

    fn options(count: &str) -> HashMap<String, String> {
        HashMap::from([("count".to_owned(), count.to_owned())])
    }

    fn states(entries: &[(&str, NodeState)]) -> HashMap<Urn, NodeState> {
        entries
            .iter()
            .map(|(urn, state)| (Urn::new(*urn), *state))
            .collect()
    }

    #[test]
    fn static_count_scales_toward_target() {
        let policy = StaticCount::from_options(&options("3")).unwrap();

        let decision = policy.check(&HashMap::new(), &states(&[("a", NodeState::Active)]));
        assert_eq!(decision.direction, ScaleDirection::Up);
        assert_eq!(decision.amount, 2);

        let decision = policy.check(
            &HashMap::new(),
            &states(&[
                ("a", NodeState::Active),
                ("b", NodeState::Active),
                ("c", NodeState::Running),
                ("d", NodeState::Active),
            ]),
        );
        assert_eq!(decision.direction, ScaleDirection::Down);
        assert_eq!(decision.amount, 1);

        let decision = policy.check(
            &HashMap::new(),
            &states(&[
                ("a", NodeState::Active),
                ("b", NodeState::Active),
                ("c", NodeState::Active),
            ]),
        );
        assert_eq!(decision.direction, ScaleDirection::Nop);
    }

    #[test]
    fn static_count_ignores_unhealthy_nodes() {
        let policy = StaticCount::from_options(&options("2")).unwrap();

        let decision = policy.check(
            &HashMap::new(),
            &states(&[
                ("a", NodeState::Active),
                ("b", NodeState::Unhealthy),
            ]),
        );
        assert_eq!(decision.direction, ScaleDirection::Up);
        assert_eq!(decision.amount, 1);
    }

    #[test]
    fn static_count_rejects_bad_options() {
        assert!(matches!(
            StaticCount::from_options(&HashMap::new()),
            Err(ScaleError::InvalidOption { .. })
        ));
        assert!(matches!(
            StaticCount::from_options(&options("many")),
            Err(ScaleError::InvalidOption { .. })
        ));
    }

    #[test]
    fn builtin_policies_register() {
        let registry = PolicyRegistry::new();
        register_builtin_policies(&registry);

        assert!(registry.contains(POLICY_STATIC_COUNT));
        assert!(registry.build(POLICY_STATIC_COUNT, &options("2")).is_ok());
        assert!(registry.build(POLICY_STATIC_COUNT, &HashMap::new()).is_err());
    }

    #[test]
    fn builtin_metrics_register() {
        let registry = MetricRegistry::new();
        register_builtin_metrics(&registry);

        let metrics = registry.instantiate();
        let snapshot = metrics.update(&HashMap::new());

        assert_eq!(snapshot[METRIC_ACTIVE_NODES], 0.0);
        assert_eq!(snapshot[METRIC_TOTAL_INVOCATIONS], 0.0);
        assert_eq!(snapshot[METRIC_MEAN_EXEC_TIME_MS], 0.0);
    }

    struct IdleConnection;

    #[async_trait::async_trait]
    impl sigma_node::Connection for IdleConnection {
        async fn send(&self, _event: sigma_proto::DispatchEvent) -> sigma_node::Result<()> {
            Err(sigma_node::NodeError::NotConnected)
        }

        async fn receive(&self) -> sigma_node::Result<sigma_proto::ExecutionResult> {
            std::future::pending().await
        }

        fn is_registered(&self) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn close(&self) {}
    }

    struct StubInstance;

    #[async_trait::async_trait]
    impl sigma_launcher::Instance for StubInstance {
        fn healthy(&self) -> sigma_launcher::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> sigma_launcher::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn active_nodes_counts_selectable_controllers() {
        let registry = MetricRegistry::new();
        register_builtin_metrics(&registry);
        let metrics = registry.instantiate();

        let active = Arc::new(NodeController::new(
            Urn::new("sigma:node:greet/1"),
            Box::new(StubInstance),
            Arc::new(IdleConnection),
        ));
        let disabled = Arc::new(NodeController::new(
            Urn::new("sigma:node:greet/2"),
            Box::new(StubInstance),
            Arc::new(IdleConnection),
        ));
        disabled.disable();

        let mut controllers = HashMap::new();
        controllers.insert(active.urn().clone(), active);
        controllers.insert(disabled.urn().clone(), disabled);

        let snapshot = metrics.update(&controllers);
        assert_eq!(snapshot[METRIC_ACTIVE_NODES], 1.0);
        assert_eq!(snapshot[METRIC_TOTAL_INVOCATIONS], 0.0);
    }
}
