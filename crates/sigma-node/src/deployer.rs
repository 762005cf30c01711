//! Node deployment: slot reservation, launch, registration wait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sigma_launcher::{LaunchConfig, Launcher};
use sigma_proto::{FunctionSpec, Urn};

use crate::connection::Connection;
use crate::controller::NodeController;
use crate::error::{NodeError, Result};
use crate::handler::NodeHandler;

/// Length of generated registration secrets.
const SECRET_LENGTH: usize = 32;

/// Deploys worker nodes.
#[async_trait]
pub trait Deploy: Send + Sync {
    /// Deploys a new node for the spec under the given URN and returns a
    /// controller for it.
    async fn deploy(&self, urn: Urn, spec: FunctionSpec) -> Result<Arc<NodeController>>;
}

/// Deployment timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Maximum time to wait for a launched worker to register.
    pub timeout: Duration,

    /// Cadence of the registration poll.
    pub poll_interval: Duration,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Default deployer: reserves a slot in the node handler, launches a worker
/// instance and waits for it to register.
pub struct NodeDeployer {
    handler: Arc<NodeHandler>,
    launcher: Arc<dyn Launcher>,
    advertise_address: String,
    config: DeployConfig,
}

impl NodeDeployer {
    /// Creates a deployer advertising the given handler address to workers.
    pub fn new(
        handler: Arc<NodeHandler>,
        launcher: Arc<dyn Launcher>,
        advertise_address: impl Into<String>,
    ) -> Self {
        Self {
            handler,
            launcher,
            advertise_address: advertise_address.into(),
            config: DeployConfig::default(),
        }
    }

    /// Overrides the deployment timing configuration.
    #[must_use]
    pub fn with_config(mut self, config: DeployConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl Deploy for NodeDeployer {
    async fn deploy(&self, urn: Urn, spec: FunctionSpec) -> Result<Arc<NodeController>> {
        let secret = generate_secret();

        // The slot must exist before the worker comes up, or its
        // registration would race the reservation.
        let conn = self.handler.reserve(urn.clone(), secret.clone(), spec.clone())?;

        debug!(urn = %urn, runtime = %spec.runtime, "launching worker instance");

        let launch = LaunchConfig {
            address: self.advertise_address.clone(),
            secret,
            urn: urn.clone(),
        };
        let instance = match self.launcher.create(&spec.runtime, launch).await {
            Ok(instance) => instance,
            Err(err) => {
                let _ = self.handler.release(&urn);
                return Err(err.into());
            }
        };

        let registered = tokio::time::timeout(self.config.timeout, async {
            loop {
                if conn.is_registered() {
                    return;
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        })
        .await;

        if registered.is_err() {
            warn!(urn = %urn, "worker did not register in time");
            if let Err(err) = instance.stop().await {
                warn!(urn = %urn, error = %err, "failed to stop unregistered instance");
            }
            let _ = self.handler.release(&urn);
            return Err(NodeError::DeployTimeout(urn));
        }

        info!(urn = %urn, "node deployed");

        let controller = Arc::new(NodeController::new(urn, instance, conn));

        let handler = self.handler.clone();
        controller.on_destroy(move |ctrl| {
            if let Err(err) = handler.release(ctrl.urn()) {
                debug!(urn = %ctrl.urn(), error = %err, "slot already released");
            }
        });

        Ok(controller)
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}
