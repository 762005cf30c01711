//! Worker instance launcher abstraction.
//!
//! A [`Launcher`] materialises a worker [`Instance`] for a given execution
//! type: a process, a container, a microVM - the dispatch plane does not
//! care. The deployer hands the launcher a [`LaunchConfig`] carrying the
//! handler address, the registration secret, and the node URN; the launcher
//! is expected to surface those to the worker via its environment.

mod mock;

pub use mock::{LaunchRecord, MockInstance, MockLauncher};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigma_proto::Urn;

/// Environment variable carrying the node handler address.
pub const ENV_HANDLER_ADDRESS: &str = "HANDLER_ADDRESS";

/// Environment variable carrying the registration secret.
pub const ENV_ACCESS_SECRET: &str = "ACCESS_SECRET";

/// Environment variable carrying the instance URN.
pub const ENV_INSTANCE_URN: &str = "INSTANCE_URN";

/// Launcher errors.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// No launcher is configured for the requested execution type.
    #[error("unknown execution type: {0}")]
    UnknownType(String),

    /// The launcher failed to create the instance.
    #[error("launch failed: {0}")]
    Failed(String),

    /// The instance is no longer healthy.
    #[error("instance unhealthy: {0}")]
    Unhealthy(String),

    /// The instance could not be stopped.
    #[error("stop failed: {0}")]
    Stop(String),
}

/// Result type for launcher operations.
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Launch configuration handed to a new worker instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Address of the node handler the worker should connect back to.
    pub address: String,

    /// Registration secret minted for this worker's slot.
    pub secret: String,

    /// URN assigned to the worker.
    pub urn: Urn,
}

impl LaunchConfig {
    /// Returns the configuration as worker environment variables.
    #[must_use]
    pub fn env_vars(&self) -> HashMap<String, String> {
        HashMap::from([
            (ENV_HANDLER_ADDRESS.to_owned(), self.address.clone()),
            (ENV_ACCESS_SECRET.to_owned(), self.secret.clone()),
            (ENV_INSTANCE_URN.to_owned(), self.urn.to_string()),
        ])
    }

    /// Reads the configuration from the process environment.
    ///
    /// Used by worker-side code; missing variables come back empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            address: std::env::var(ENV_HANDLER_ADDRESS).unwrap_or_default(),
            secret: std::env::var(ENV_ACCESS_SECRET).unwrap_or_default(),
            urn: Urn::new(std::env::var(ENV_INSTANCE_URN).unwrap_or_default()),
        }
    }
}

/// A workload created by a [`Launcher`].
#[async_trait]
pub trait Instance: Send + Sync {
    /// Probes instance health; returns an error when the workload is gone
    /// or wedged.
    fn healthy(&self) -> Result<()>;

    /// Stops the instance.
    async fn stop(&self) -> Result<()>;
}

/// Creates and manages the lifecycle of worker instances.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Creates a new instance for the given execution type.
    async fn create(&self, node_type: &str, config: LaunchConfig) -> Result<Box<dyn Instance>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_config_env_vars() {
        let config = LaunchConfig {
            address: "127.0.0.1:50052".to_owned(),
            secret: "s3cret".to_owned(),
            urn: Urn::new("sigma:node:greet/1"),
        };

        let env = config.env_vars();
        assert_eq!(env[ENV_HANDLER_ADDRESS], "127.0.0.1:50052");
        assert_eq!(env[ENV_ACCESS_SECRET], "s3cret");
        assert_eq!(env[ENV_INSTANCE_URN], "sigma:node:greet/1");
    }
}
