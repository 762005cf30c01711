//! Function controller registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sigma_function::{ControlLoopConfig, FunctionController};
use sigma_node::{Deploy, NodeState, NodeStats};
use sigma_proto::{Event, FunctionSpec, Urn};
use sigma_scale::{AutoScaler, PolicyRegistry};
use sigma_trigger::{ConditionEvaluator, EventTypeCondition, TriggerBuilder};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};

/// One node of a registered function, as reported by inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Node URN.
    pub urn: Urn,
    /// Current node state.
    pub state: NodeState,
    /// Invocation statistics.
    pub stats: NodeStats,
}

/// A function registered at the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRegistration {
    /// Function URN.
    pub urn: Urn,
    /// The submitted function spec.
    pub spec: FunctionSpec,
    /// The nodes currently backing the function.
    pub nodes: Vec<NodeInstance>,
}

struct Registration {
    owner: Option<String>,
    ctrl: FunctionController,
}

/// Creates, supervises and destroys function controllers.
///
/// One scheduler runs per process. Every function it creates gets an
/// autoscaler (the built-in availability rule applies when the spec names
/// no policies), the configured deployer and the trigger builder.
pub struct Scheduler {
    id: String,
    deployer: Arc<dyn Deploy>,
    trigger_builder: Option<Arc<dyn TriggerBuilder>>,
    evaluator: Arc<dyn ConditionEvaluator>,
    config: SchedulerConfig,
    controllers: Mutex<HashMap<String, Registration>>,
}

impl Scheduler {
    /// Creates a scheduler that deploys nodes through `deployer`.
    pub fn new(deployer: Arc<dyn Deploy>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            deployer,
            trigger_builder: None,
            evaluator: Arc::new(EventTypeCondition),
            config: SchedulerConfig::default(),
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the trigger builder handed to function controllers.
    #[must_use]
    pub fn with_trigger_builder(mut self, builder: Arc<dyn TriggerBuilder>) -> Self {
        self.trigger_builder = Some(builder);
        self
    }

    /// Sets the condition evaluator handed to function controllers.
    #[must_use]
    pub fn with_condition_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Overrides the scheduler configuration.
    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the scheduler's URN.
    #[must_use]
    pub fn urn(&self) -> Urn {
        Urn::new(format!("sigma:scheduler:{}", self.id))
    }

    /// Creates a function controller for the spec and starts it.
    ///
    /// The optional `owner` scopes the function for
    /// [`functions`](Self::functions) listings. If the controller fails to
    /// start, the registration is rolled back.
    pub async fn create(&self, spec: FunctionSpec, owner: Option<String>) -> Result<Urn> {
        if spec.id.is_empty() {
            return Err(SchedulerError::InvalidSpec("missing function id"));
        }
        if spec.runtime.is_empty() {
            return Err(SchedulerError::InvalidSpec("missing execution type"));
        }

        let autoscaler = AutoScaler::from_spec(&spec.policies, PolicyRegistry::global())
            .map_err(sigma_function::FunctionError::from)?;

        let mut builder = FunctionController::builder(spec.clone())
            .deployer(self.deployer.clone())
            .autoscaler(autoscaler)
            .condition_evaluator(self.evaluator.clone())
            .config(ControlLoopConfig {
                interval: self.config.control_loop_interval,
                scale_down_retries: self.config.scale_down_retries,
                scale_down_retry_gap: self.config.scale_down_retry_gap,
            });

        if let Some(trigger_builder) = &self.trigger_builder {
            builder = builder.trigger_builder(trigger_builder.clone());
        }

        let ctrl = builder.build()?;
        let urn = ctrl.urn().clone();

        {
            let mut controllers = self.controllers.lock();
            if controllers.contains_key(&spec.id) {
                return Err(SchedulerError::DuplicateFunction(spec.id));
            }
            controllers.insert(
                spec.id.clone(),
                Registration {
                    owner,
                    ctrl: ctrl.clone(),
                },
            );
        }

        if let Err(err) = ctrl.start() {
            // Roll the insertion back; a controller that never started must
            // not be reachable through the registry.
            self.controllers.lock().remove(&spec.id);
            return Err(err.into());
        }

        info!(function = %urn, "function created");
        Ok(urn)
    }

    /// Destroys the function registered under `id` and all of its nodes.
    ///
    /// Teardown errors are logged; the registry entry is removed
    /// regardless.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        let registration = self
            .controllers
            .lock()
            .remove(id)
            .ok_or_else(|| SchedulerError::UnknownFunction(id.to_owned()))?;

        if let Err(err) = registration.ctrl.stop().await {
            warn!(function = %id, error = %err, "failed to stop function controller");
        }
        if let Err(err) = registration.ctrl.destroy_all().await {
            warn!(function = %id, error = %err, "failed to destroy function nodes");
        }

        info!(function = %id, "function destroyed");
        Ok(())
    }

    /// Dispatches an event to the function registered under `id`.
    pub async fn dispatch(&self, id: &str, event: Event) -> Result<(Urn, Vec<u8>)> {
        let ctrl = self
            .lookup(id)
            .ok_or_else(|| SchedulerError::UnknownFunction(id.to_owned()))?;

        ctrl.dispatch(event).await.map_err(Into::into)
    }

    /// Returns the registration snapshot for the function under `id`.
    pub async fn inspect(&self, id: &str) -> Result<FunctionRegistration> {
        let ctrl = self
            .lookup(id)
            .ok_or_else(|| SchedulerError::UnknownFunction(id.to_owned()))?;

        Ok(Self::registration(&ctrl).await)
    }

    /// Lists registered functions.
    ///
    /// With a `scope`, only functions created under that owner are
    /// returned; unowned functions stay hidden from scoped listings.
    pub async fn functions(&self, scope: Option<&str>) -> Vec<FunctionRegistration> {
        let snapshot: Vec<FunctionController> = {
            let controllers = self.controllers.lock();
            controllers
                .values()
                .filter(|registration| match scope {
                    Some(owner) => registration.owner.as_deref() == Some(owner),
                    None => true,
                })
                .map(|registration| registration.ctrl.clone())
                .collect()
        };

        let mut registrations = Vec::with_capacity(snapshot.len());
        for ctrl in snapshot {
            registrations.push(Self::registration(&ctrl).await);
        }
        registrations
    }

    fn lookup(&self, id: &str) -> Option<FunctionController> {
        self.controllers
            .lock()
            .get(id)
            .map(|registration| registration.ctrl.clone())
    }

    async fn registration(ctrl: &FunctionController) -> FunctionRegistration {
        let states = ctrl.nodes().await;
        let stats = ctrl.stats().await;

        let nodes = states
            .into_iter()
            .map(|(urn, state)| {
                let stats = stats.get(&urn).cloned().unwrap_or_else(NodeStats::new);
                NodeInstance { urn, state, stats }
            })
            .collect();

        FunctionRegistration {
            urn: ctrl.urn().clone(),
            spec: ctrl.function_spec().clone(),
            nodes,
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
