//! Per-function supervisor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sigma_node::{Deploy, NodeController, NodeState, NodeStats};
use sigma_proto::{
    CorrelationId, DispatchEvent, Event, FunctionSpec, TriggerSpec, Urn,
};
use sigma_scale::{AutoScaler, MetricRegistry, Metrics, PolicyRegistry, ScaleDirection};
use sigma_trigger::{ConditionEvaluator, EventTypeCondition, Trigger, TriggerBuilder};

use crate::config::ControlLoopConfig;
use crate::error::{FunctionError, Result};

/// Callback executed on every control-loop tick.
pub type ControlLoopHook = Box<dyn Fn(&FunctionController) + Send + Sync>;

struct RunState {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    spec: FunctionSpec,
    urn: Urn,

    nodes: tokio::sync::RwLock<HashMap<Urn, Arc<NodeController>>>,

    deployer: Option<Arc<dyn Deploy>>,
    autoscaler: Option<AutoScaler>,
    metrics: Metrics,

    trigger_builder: Option<Arc<dyn TriggerBuilder>>,
    evaluator: Arc<dyn ConditionEvaluator>,

    // Separate lock so hooks never order against the node map.
    hooks: RwLock<Vec<(String, ControlLoopHook)>>,

    config: ControlLoopConfig,
    run: Mutex<Option<RunState>>,
}

/// Supervises all nodes of one function.
///
/// The controller owns the node map, the function's triggers and the
/// periodic control loop: reap unhealthy nodes, refresh metrics, autoscale,
/// run hooks. Handles are cheap to clone and share one supervisor.
#[derive(Clone)]
pub struct FunctionController {
    inner: Arc<Inner>,
}

impl FunctionController {
    /// Starts building a controller for the spec.
    #[must_use]
    pub fn builder(spec: FunctionSpec) -> FunctionControllerBuilder {
        FunctionControllerBuilder::new(spec)
    }

    /// Returns the function URN.
    pub fn urn(&self) -> &Urn {
        &self.inner.urn
    }

    /// Returns the function specification.
    pub fn function_spec(&self) -> &FunctionSpec {
        &self.inner.spec
    }

    /// Starts the control loop and the trigger consumers.
    pub fn start(&self) -> Result<()> {
        let mut run = self.inner.run.lock();
        if run.is_some() {
            return Err(FunctionError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();

        if let Some(builder) = &self.inner.trigger_builder {
            for trigger_spec in &self.inner.spec.triggers {
                let trigger = match builder.build(&trigger_spec.trigger_type, &trigger_spec.options)
                {
                    Ok(trigger) => trigger,
                    Err(err) => {
                        cancel.cancel();
                        for task in &tasks {
                            task.abort();
                        }
                        return Err(err.into());
                    }
                };

                tasks.push(tokio::spawn(consume_trigger(
                    self.clone(),
                    trigger,
                    trigger_spec.clone(),
                    cancel.clone(),
                )));
            }
        }

        tasks.push(tokio::spawn(control_loop(self.clone(), cancel.clone())));

        info!(urn = %self.inner.urn, "function controller started");
        *run = Some(RunState { cancel, tasks });
        Ok(())
    }

    /// Stops the control loop and all trigger consumers.
    pub async fn stop(&self) -> Result<()> {
        let state = self.inner.run.lock().take();
        let Some(state) = state else {
            return Err(FunctionError::NotRunning);
        };

        state.cancel.cancel();
        for task in state.tasks {
            let _ = task.await;
        }

        info!(urn = %self.inner.urn, "function controller stopped");
        Ok(())
    }

    /// Registers a deployed node with the controller.
    pub async fn add_node_controller(&self, node: Arc<NodeController>) {
        let urn = node.urn().clone();
        self.inner.nodes.write().await.insert(urn.clone(), node);
        info!(urn = %urn, function = %self.inner.urn, "node attached to controller");
    }

    /// Destroys the node registered under `urn`.
    ///
    /// The node is removed from the map before it is closed, so on-destroy
    /// hooks never observe it as a member.
    pub async fn destroy_node(&self, urn: &Urn) -> Result<()> {
        let node = self
            .inner
            .nodes
            .write()
            .await
            .remove(urn)
            .ok_or_else(|| FunctionError::UnknownNode(urn.clone()))?;

        info!(urn = %urn, function = %self.inner.urn, "destroying node");
        node.close().await?;
        Ok(())
    }

    /// Destroys every node. The map is cleared regardless of close errors;
    /// the first error is returned.
    pub async fn destroy_all(&self) -> Result<()> {
        let nodes = std::mem::take(&mut *self.inner.nodes.write().await);

        let mut first_error = None;
        for (urn, node) in nodes {
            if let Err(err) = node.close().await {
                warn!(urn = %urn, error = %err, "failed to destroy node");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Returns the state of every registered node.
    pub async fn nodes(&self) -> HashMap<Urn, NodeState> {
        let nodes = self.inner.nodes.read().await;
        nodes
            .iter()
            .map(|(urn, node)| (urn.clone(), node.state()))
            .collect()
    }

    /// Returns statistics for every registered node.
    pub async fn stats(&self) -> HashMap<Urn, NodeStats> {
        let nodes = self.inner.nodes.read().await;
        nodes
            .iter()
            .map(|(urn, node)| (urn.clone(), node.stats()))
            .collect()
    }

    /// Dispatches an event to the first selectable node.
    ///
    /// Returns the selected node's URN together with the execution output.
    /// The map lock only covers node selection; the round trip itself runs
    /// without it, so a slow worker never blocks control-loop map writes.
    pub async fn dispatch(&self, event: Event) -> Result<(Urn, Vec<u8>)> {
        let selected = {
            let nodes = self.inner.nodes.read().await;
            nodes
                .iter()
                .find(|(_, node)| node.state().can_select())
                .map(|(urn, node)| (urn.clone(), node.clone()))
        };

        let Some((urn, node)) = selected else {
            return Err(FunctionError::NoSelectableNodes);
        };

        let wire_event = DispatchEvent {
            id: CorrelationId::new(),
            urn: urn.to_string(),
            payload: event.payload,
        };

        match node.dispatch(wire_event).await {
            Ok(data) => {
                info!(node = %urn, function = %self.inner.urn, "dispatched event");
                Ok((urn, data))
            }
            Err(err) => {
                warn!(node = %urn, function = %self.inner.urn, error = %err, "dispatch failed");
                Err(err.into())
            }
        }
    }

    /// Attaches a control loop hook under a unique name.
    pub fn attach_control_loop_hook(
        &self,
        name: impl Into<String>,
        hook: impl Fn(&FunctionController) + Send + Sync + 'static,
    ) -> Result<()> {
        let name = name.into();
        let mut hooks = self.inner.hooks.write();

        if hooks.iter().any(|(existing, _)| *existing == name) {
            return Err(FunctionError::HookAlreadyAttached(name));
        }

        debug!(hook = %name, function = %self.inner.urn, "attached control loop hook");
        hooks.push((name, Box::new(hook)));
        Ok(())
    }

    /// Detaches the control loop hook registered under `name`.
    pub fn detach_control_loop_hook(&self, name: &str) -> Result<()> {
        let mut hooks = self.inner.hooks.write();
        let before = hooks.len();
        hooks.retain(|(existing, _)| existing != name);

        if hooks.len() == before {
            return Err(FunctionError::HookNotFound(name.to_owned()));
        }

        debug!(hook = %name, function = %self.inner.urn, "detached control loop hook");
        Ok(())
    }

    /// Runs one control-loop tick: reap, metrics, autoscale, hooks.
    pub(crate) async fn run_tick(&self) {
        // Unhealthy nodes first; they must not survive into the metrics
        // snapshot or the autoscale decision.
        let states = self.nodes().await;
        for (urn, state) in &states {
            if !state.is_healthy() {
                if let Err(err) = self.destroy_node(urn).await {
                    warn!(urn = %urn, error = %err, "failed to destroy unhealthy node");
                }
            }
        }

        let metrics = {
            let nodes = self.inner.nodes.write().await;
            self.inner.metrics.update(&nodes)
        };

        if let Some(scaler) = &self.inner.autoscaler {
            let decision = scaler.check(&metrics, &self.nodes().await);
            match decision.direction {
                ScaleDirection::Nop => {}
                ScaleDirection::Up => {
                    info!(
                        function = %self.inner.urn,
                        policy = decision.policy.as_deref().unwrap_or(""),
                        amount = decision.amount,
                        "scaling up"
                    );
                    self.scale_up(decision.amount).await;
                }
                ScaleDirection::Down => {
                    info!(
                        function = %self.inner.urn,
                        policy = decision.policy.as_deref().unwrap_or(""),
                        amount = decision.amount,
                        "scaling down"
                    );
                    self.scale_down(decision.amount).await;
                }
            }
        }

        self.run_hooks();
    }

    async fn scale_up(&self, amount: usize) {
        let Some(deployer) = self.inner.deployer.clone() else {
            error!(function = %self.inner.urn, "scale-up requested without a deployer");
            return;
        };

        let deploys = (0..amount).map(|_| {
            let deployer = deployer.clone();
            let spec = self.inner.spec.clone();
            let urn = self.new_node_urn();
            async move { deployer.deploy(urn, spec).await }
        });

        for result in futures::future::join_all(deploys).await {
            match result {
                Ok(node) => self.add_node_controller(node).await,
                Err(err) => error!(function = %self.inner.urn, error = %err, "failed to deploy node"),
            }
        }
    }

    async fn scale_down(&self, amount: usize) {
        let mut removed = 0usize;
        let mut retries = 0u32;

        while removed < amount {
            let snapshot = self.nodes().await;
            let mut destroyed_this_sweep = 0usize;

            // Preference order; Running nodes are never destroyed here.
            for target in [NodeState::Active, NodeState::Disabled, NodeState::Unhealthy] {
                for (urn, state) in &snapshot {
                    if *state != target || removed >= amount {
                        continue;
                    }
                    match self.destroy_node(urn).await {
                        Ok(()) => {
                            removed += 1;
                            destroyed_this_sweep += 1;
                        }
                        Err(err) => {
                            warn!(urn = %urn, error = %err, "failed to destroy node during scale-down");
                        }
                    }
                }
            }

            if removed >= amount {
                return;
            }

            if destroyed_this_sweep == 0 {
                retries += 1;
                if retries > self.inner.config.scale_down_retries {
                    warn!(
                        function = %self.inner.urn,
                        removed,
                        requested = amount,
                        "giving up on scale-down"
                    );
                    return;
                }
            }

            tokio::time::sleep(self.inner.config.scale_down_retry_gap).await;
        }
    }

    fn run_hooks(&self) {
        let hooks = self.inner.hooks.read();
        for (name, hook) in hooks.iter() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(self)));
            if outcome.is_err() {
                error!(hook = %name, function = %self.inner.urn, "control loop hook panicked");
            }
        }
    }

    fn new_node_urn(&self) -> Urn {
        Urn::new(format!(
            "sigma:node:{}/{}",
            self.inner.spec.id,
            ulid::Ulid::new()
        ))
    }
}

impl std::fmt::Debug for FunctionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionController")
            .field("urn", &self.inner.urn)
            .finish_non_exhaustive()
    }
}

async fn control_loop(ctrl: FunctionController, cancel: CancellationToken) {
    loop {
        ctrl.run_tick().await;

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(ctrl.inner.config.interval) => {}
        }
    }
}

async fn consume_trigger(
    ctrl: FunctionController,
    mut trigger: Box<dyn Trigger>,
    spec: TriggerSpec,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = trigger.next() => match event {
                Some(event) => event,
                None => {
                    debug!(trigger = %spec.trigger_type, "trigger stream ended");
                    return;
                }
            },
        };

        let accepted =
            ctrl.inner
                .evaluator
                .evaluate(&spec.condition, &event, &ctrl.inner.spec.parameters);

        match accepted {
            Ok(true) => match ctrl.dispatch(event.clone()).await {
                Ok((node, _)) => {
                    info!(node = %node, event_type = %event.event_type, "dispatched trigger event");
                }
                Err(err) => {
                    error!(event_type = %event.event_type, error = %err, "failed to dispatch trigger event");
                }
            },
            Ok(false) => {
                debug!(event_type = %event.event_type, condition = %spec.condition, "condition not satisfied");
            }
            Err(err) => {
                error!(condition = %spec.condition, error = %err, "failed to evaluate trigger condition");
            }
        }
    }
}

/// Builder for [`FunctionController`].
pub struct FunctionControllerBuilder {
    spec: FunctionSpec,
    deployer: Option<Arc<dyn Deploy>>,
    autoscaler: Option<AutoScaler>,
    metrics: Option<Metrics>,
    trigger_builder: Option<Arc<dyn TriggerBuilder>>,
    evaluator: Arc<dyn ConditionEvaluator>,
    config: ControlLoopConfig,
}

impl FunctionControllerBuilder {
    /// Creates a builder for the spec.
    #[must_use]
    pub fn new(spec: FunctionSpec) -> Self {
        Self {
            spec,
            deployer: None,
            autoscaler: None,
            metrics: None,
            trigger_builder: None,
            evaluator: Arc::new(EventTypeCondition),
            config: ControlLoopConfig::default(),
        }
    }

    /// Sets the deployer used for scale-up.
    #[must_use]
    pub fn deployer(mut self, deployer: Arc<dyn Deploy>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    /// Sets an explicitly constructed autoscaler.
    ///
    /// Without this, the spec's policy map is built from the global policy
    /// registry.
    #[must_use]
    pub fn autoscaler(mut self, autoscaler: AutoScaler) -> Self {
        self.autoscaler = Some(autoscaler);
        self
    }

    /// Sets the metric set; defaults to the global metric registry.
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the trigger builder; without one the spec's triggers are
    /// ignored.
    #[must_use]
    pub fn trigger_builder(mut self, builder: Arc<dyn TriggerBuilder>) -> Self {
        self.trigger_builder = Some(builder);
        self
    }

    /// Sets the condition evaluator for trigger predicates.
    #[must_use]
    pub fn condition_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Sets the control-loop configuration.
    #[must_use]
    pub fn config(mut self, config: ControlLoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the controller.
    ///
    /// Fails with [`FunctionError::MissingDeployer`] when an autoscaler is
    /// configured (explicitly or via spec policies) without a deployer.
    pub fn build(self) -> Result<FunctionController> {
        let autoscaler = match self.autoscaler {
            Some(autoscaler) => Some(autoscaler),
            None if !self.spec.policies.is_empty() => Some(AutoScaler::from_spec(
                &self.spec.policies,
                PolicyRegistry::global(),
            )?),
            None => None,
        };

        if autoscaler.is_some() && self.deployer.is_none() {
            return Err(FunctionError::MissingDeployer);
        }

        let metrics = self
            .metrics
            .unwrap_or_else(|| MetricRegistry::global().instantiate());

        let urn = Urn::new(format!("sigma:function:{}", self.spec.id));

        Ok(FunctionController {
            inner: Arc::new(Inner {
                urn,
                spec: self.spec,
                nodes: tokio::sync::RwLock::new(HashMap::new()),
                deployer: self.deployer,
                autoscaler,
                metrics,
                trigger_builder: self.trigger_builder,
                evaluator: self.evaluator,
                hooks: RwLock::new(Vec::new()),
                config: self.config,
                run: Mutex::new(None),
            }),
        })
    }
}
