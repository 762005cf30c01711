//! Per-function metrics recomputed on every control-loop tick.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};

use sigma_node::NodeController;
use sigma_proto::Urn;

/// A metric recomputed from the current controller set.
pub trait Metric: Send + Sync {
    /// Recalculates the metric value; called once per control-loop tick.
    fn update(&mut self, controllers: &HashMap<Urn, Arc<NodeController>>) -> f64;
}

/// Builds a fresh metric instance for one function controller.
pub type MetricFactory = Box<dyn Fn() -> Box<dyn Metric> + Send + Sync>;

/// Registry of named metric factories.
#[derive(Default)]
pub struct MetricRegistry {
    factories: RwLock<HashMap<String, MetricFactory>>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: LazyLock<MetricRegistry> = LazyLock::new(MetricRegistry::new);
        &GLOBAL
    }

    /// Registers a factory under a unique name.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken; duplicate registration is a
    /// programming error.
    pub fn register(&self, name: impl Into<String>, factory: MetricFactory) {
        let name = name.into();
        let mut factories = self.factories.write();
        assert!(
            !factories.contains_key(&name),
            "metric factory {name:?} already registered"
        );
        factories.insert(name, factory);
    }

    /// Instantiates one metric per registered factory.
    #[must_use]
    pub fn instantiate(&self) -> Metrics {
        let factories = self.factories.read();
        let metrics = factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory()))
            .collect();

        Metrics {
            metrics: Mutex::new(metrics),
            last: RwLock::new(HashMap::new()),
        }
    }

    /// Clears all registered factories. Intended for tests.
    pub fn reset(&self) {
        self.factories.write().clear();
    }
}

/// The metric set owned by one function controller.
pub struct Metrics {
    metrics: Mutex<HashMap<String, Box<dyn Metric>>>,
    last: RwLock<HashMap<String, f64>>,
}

impl Metrics {
    /// Recomputes every metric from the current controller map and returns
    /// the snapshot. The snapshot is also cached for [`last`](Self::last).
    pub fn update(&self, controllers: &HashMap<Urn, Arc<NodeController>>) -> HashMap<String, f64> {
        let mut metrics = self.metrics.lock();
        let snapshot: HashMap<String, f64> = metrics
            .iter_mut()
            .map(|(name, metric)| (name.clone(), metric.update(controllers)))
            .collect();

        *self.last.write() = snapshot.clone();
        snapshot
    }

    /// Returns the most recently computed snapshot.
    #[must_use]
    pub fn last(&self) -> HashMap<String, f64> {
        self.last.read().clone()
    }
}
