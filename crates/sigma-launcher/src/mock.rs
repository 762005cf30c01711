//! In-memory launcher for tests and local runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Instance, LaunchConfig, LaunchError, Launcher, Result};

/// An instance created by the [`MockLauncher`].
///
/// Health and stop behaviour are scriptable so tests can simulate dying
/// workers.
#[derive(Debug)]
pub struct MockInstance {
    healthy: AtomicBool,
    stopped: AtomicBool,
}

impl MockInstance {
    /// Creates a healthy mock instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    /// Marks the instance as unhealthy.
    pub fn fail(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Returns true once `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Instance for Arc<MockInstance> {
    fn healthy(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(LaunchError::Unhealthy("instance stopped".to_owned()));
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LaunchError::Unhealthy("instance failed".to_owned()))
        }
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Record of a single launch request.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    /// Execution type the launch asked for.
    pub node_type: String,
    /// Configuration handed to the worker.
    pub config: LaunchConfig,
}

/// Launcher that records launches and hands out [`MockInstance`]s.
#[derive(Debug, Default)]
pub struct MockLauncher {
    launches: Mutex<Vec<LaunchRecord>>,
    instances: Mutex<Vec<Arc<MockInstance>>>,
    fail_next: AtomicBool,
}

impl MockLauncher {
    /// Creates a new mock launcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create` call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Returns all recorded launches.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().clone()
    }

    /// Returns the instances created so far, in launch order.
    #[must_use]
    pub fn instances(&self) -> Vec<Arc<MockInstance>> {
        self.instances.lock().clone()
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn create(&self, node_type: &str, config: LaunchConfig) -> Result<Box<dyn Instance>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(LaunchError::Failed("mock launch failure".to_owned()));
        }

        self.launches.lock().push(LaunchRecord {
            node_type: node_type.to_owned(),
            config,
        });

        let instance = MockInstance::new();
        self.instances.lock().push(instance.clone());

        Ok(Box::new(instance))
    }
}
