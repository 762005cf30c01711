//! Per-node controller: state, statistics, and dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use sigma_launcher::Instance;
use sigma_proto::{DispatchEvent, ExecutionOutcome, Urn};

use crate::connection::Connection;
use crate::error::{NodeError, Result};
use crate::router::Router;
use crate::state::{NodeState, NodeStats};

/// Callback invoked while a node controller is being destroyed.
pub type DestroyHook = Box<dyn Fn(&NodeController) + Send + Sync>;

/// Owns one worker: its launcher instance and its routed connection.
///
/// The controller tracks node state and invocation statistics and executes
/// individual dispatches. It is destroyed by its owning function controller,
/// which removes it from the node map before calling [`close`](Self::close).
pub struct NodeController {
    urn: Urn,
    instance: Box<dyn Instance>,
    router: Router,

    state: RwLock<NodeState>,
    stats: RwLock<NodeStats>,
    on_destroy: Mutex<Vec<DestroyHook>>,
    closed: AtomicBool,
}

impl NodeController {
    /// Creates a controller for a registered worker.
    pub fn new(urn: Urn, instance: Box<dyn Instance>, conn: Arc<dyn Connection>) -> Self {
        Self {
            urn,
            instance,
            router: Router::new(conn),
            state: RwLock::new(NodeState::Active),
            stats: RwLock::new(NodeStats::new()),
            on_destroy: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the node URN.
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Returns the current node state.
    ///
    /// An unhealthy launcher instance overrides the tracked state.
    pub fn state(&self) -> NodeState {
        if self.instance.healthy().is_err() {
            return NodeState::Unhealthy;
        }
        *self.state.read()
    }

    /// Returns a snapshot of the node statistics.
    pub fn stats(&self) -> NodeStats {
        self.stats.read().clone()
    }

    /// Marks the node as disabled; it is preserved but never selected.
    pub fn disable(&self) {
        *self.state.write() = NodeState::Disabled;
    }

    /// Re-enables a disabled node.
    pub fn enable(&self) {
        *self.state.write() = NodeState::Active;
    }

    /// Registers a hook to run when the controller is destroyed.
    pub fn on_destroy(&self, hook: impl Fn(&NodeController) + Send + Sync + 'static) {
        self.on_destroy.lock().push(Box::new(hook));
    }

    /// Dispatches an event to the worker and returns its output.
    ///
    /// The node is `Running` while the dispatch is in flight, `Active`
    /// again after a successful reply and `Unhealthy` after a routing
    /// failure or an abandoned call. Statistics are updated atomically on
    /// every completed round trip, including worker-reported execution
    /// errors.
    pub async fn dispatch(&self, event: DispatchEvent) -> Result<Vec<u8>> {
        let started_at = SystemTime::now();
        let start = Instant::now();

        self.set_state(NodeState::Running);

        // Cancellation is future-drop; without the guard a dropped call
        // would park the node in `Running`, neither selectable nor reaped.
        let mut guard = DispatchGuard {
            state: &self.state,
            armed: true,
        };

        let result = self.router.dispatch(event).await?;

        guard.armed = false;
        self.set_state(NodeState::Active);
        self.stats
            .write()
            .record_invocation(started_at, start.elapsed());

        match result.outcome {
            ExecutionOutcome::Data(data) => Ok(data),
            ExecutionOutcome::Error(message) => Err(NodeError::Execution(message)),
        }
    }

    /// Destroys the controller: runs the on-destroy hooks, stops the
    /// launcher instance and closes the router.
    ///
    /// Idempotent; only the first call tears anything down.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let hooks = std::mem::take(&mut *self.on_destroy.lock());
        for hook in &hooks {
            hook(self);
        }

        if let Err(err) = self.instance.stop().await {
            warn!(urn = %self.urn, error = %err, "failed to stop instance");
        }

        match self.router.close().await {
            Ok(()) | Err(NodeError::AlreadyClosed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn set_state(&self, state: NodeState) {
        *self.state.write() = state;
    }
}

impl std::fmt::Debug for NodeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeController")
            .field("urn", &self.urn)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

/// Lands a node on `Unhealthy` when a dispatch never completes.
///
/// Disarmed on the success path; fires on routing errors and on callers
/// dropping the dispatch future.
struct DispatchGuard<'a> {
    state: &'a RwLock<NodeState>,
    armed: bool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state.write() = NodeState::Unhealthy;
        }
    }
}
