//! Shared fixtures for scheduler integration tests.

pub mod fixtures;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sigma_launcher::{Instance, LaunchConfig, LaunchError, Launcher};
use sigma_node::{worker, DeployConfig, NodeDeployer, NodeHandler};
use sigma_proto::{ExecutionOutcome, RegisterRequest, Urn};
use sigma_scheduler::{Scheduler, SchedulerConfig};

/// Handle to one simulated worker.
pub struct WorkerHandle {
    #[allow(dead_code)]
    pub urn: Urn,
    healthy: AtomicBool,
    stopped: AtomicBool,
}

impl WorkerHandle {
    /// Makes the worker's instance report as unhealthy.
    pub fn fail(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Returns true once the instance was stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct WorkerInstance(Arc<WorkerHandle>);

#[async_trait]
impl Instance for WorkerInstance {
    fn healthy(&self) -> sigma_launcher::Result<()> {
        if self.0.stopped.load(Ordering::SeqCst) {
            return Err(LaunchError::Unhealthy("worker stopped".to_owned()));
        }
        if self.0.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LaunchError::Unhealthy("worker failed".to_owned()))
        }
    }

    async fn stop(&self) -> sigma_launcher::Result<()> {
        self.0.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher that brings up an in-process echo worker for every create.
///
/// The worker registers with the node handler using the launch secret,
/// subscribes over an in-memory duplex stream and echoes every dispatch
/// payload back as its result.
pub struct EchoWorkerLauncher {
    handler: Arc<NodeHandler>,
    workers: Mutex<Vec<Arc<WorkerHandle>>>,
}

impl EchoWorkerLauncher {
    pub fn new(handler: Arc<NodeHandler>) -> Self {
        Self {
            handler,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Returns handles for all launched workers, in launch order.
    pub fn workers(&self) -> Vec<Arc<WorkerHandle>> {
        self.workers.lock().clone()
    }
}

#[async_trait]
impl Launcher for EchoWorkerLauncher {
    async fn create(
        &self,
        node_type: &str,
        config: LaunchConfig,
    ) -> sigma_launcher::Result<Box<dyn Instance>> {
        let meta = worker::auth_metadata(&config);
        let request = RegisterRequest {
            urn: config.urn.to_string(),
            node_type: node_type.to_owned(),
        };

        self.handler
            .register(&meta, &request)
            .map_err(|err| LaunchError::Failed(err.to_string()))?;

        let (server_stream, worker_stream) = tokio::io::duplex(64 * 1024);

        {
            let handler = self.handler.clone();
            let meta = meta.clone();
            tokio::spawn(async move {
                let _ = handler.subscribe(&meta, server_stream).await;
            });
        }
        tokio::spawn(worker::serve(worker_stream, |event| async move {
            ExecutionOutcome::Data(event.payload)
        }));

        let handle = Arc::new(WorkerHandle {
            urn: config.urn,
            healthy: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        });
        self.workers.lock().push(handle.clone());

        Ok(Box::new(WorkerInstance(handle)))
    }
}

/// A full in-process dispatch plane with fast timings.
pub struct TestCluster {
    #[allow(dead_code)]
    pub handler: Arc<NodeHandler>,
    pub launcher: Arc<EchoWorkerLauncher>,
    pub scheduler: Scheduler,
}

impl TestCluster {
    pub fn new() -> Self {
        let handler = Arc::new(NodeHandler::new());
        let launcher = Arc::new(EchoWorkerLauncher::new(handler.clone()));

        let deployer = NodeDeployer::new(handler.clone(), launcher.clone(), "127.0.0.1:50052")
            .with_config(DeployConfig {
                timeout: Duration::from_secs(2),
                poll_interval: Duration::from_millis(5),
            });

        let scheduler = Scheduler::new(Arc::new(deployer)).with_config(SchedulerConfig {
            control_loop_interval: Duration::from_millis(25),
            scale_down_retries: 10,
            scale_down_retry_gap: Duration::from_millis(5),
        });

        Self {
            handler,
            launcher,
            scheduler,
        }
    }

    /// Waits until the function has at least `count` selectable nodes and
    /// returns the URN of one of them.
    pub async fn wait_for_active_nodes(&self, id: &str, count: usize) -> Urn {
        for _ in 0..500 {
            if let Ok(registration) = self.scheduler.inspect(id).await {
                let active: Vec<_> = registration
                    .nodes
                    .iter()
                    .filter(|node| node.state.can_select())
                    .collect();
                if active.len() >= count {
                    return active[0].urn.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("function {id} did not reach {count} active nodes in time");
    }
}
