//! Per-worker connection state.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sigma_proto::{DispatchEvent, ExecutionResult, FunctionSpec, Urn};

use crate::error::{NodeError, Result};

/// Router-facing surface of a node connection.
///
/// Abstracted so the router can be exercised against scripted connections.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Sends a dispatch event to the worker.
    async fn send(&self, event: DispatchEvent) -> Result<()>;

    /// Receives the next execution result from the worker.
    async fn receive(&self) -> Result<ExecutionResult>;

    /// Returns true once the registration handshake has completed.
    fn is_registered(&self) -> bool;

    /// Returns true while a worker stream is bound.
    fn is_connected(&self) -> bool;

    /// Returns true once the connection has been closed.
    fn is_closed(&self) -> bool;

    /// Closes the connection. Idempotent; releases all blocked callers.
    fn close(&self);
}

/// The connection to one worker instance.
///
/// Created by the node handler at slot reservation time in the `new` state;
/// moves to `registered` when the handshake matches the reserved secret,
/// `connected` when a worker subscribes and the channel pair is bound, and
/// `closed` when either side tears the session down. Reverse transitions
/// never happen; in particular a closed connection never reopens.
pub struct NodeConnection {
    urn: Urn,
    secret: String,
    spec: FunctionSpec,

    registered: AtomicBool,
    connected: AtomicBool,

    request: Mutex<Option<mpsc::Sender<DispatchEvent>>>,
    response: tokio::sync::Mutex<Option<mpsc::Receiver<ExecutionResult>>>,

    closed: CancellationToken,
}

impl NodeConnection {
    /// Creates a connection bound to its reservation.
    pub fn new(urn: Urn, secret: impl Into<String>, spec: FunctionSpec) -> Self {
        Self {
            urn,
            secret: secret.into(),
            spec,
            registered: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            request: Mutex::new(None),
            response: tokio::sync::Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Returns the node URN.
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Returns the function spec the slot was reserved for.
    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    /// Checks a presented secret against the reserved one.
    pub(crate) fn secret_matches(&self, candidate: &str) -> bool {
        self.secret == candidate
    }

    /// Marks the registration handshake as completed.
    pub fn mark_registered(&self) {
        self.registered.store(true, Ordering::SeqCst);
    }

    /// Binds the subscribe-session channel pair.
    pub(crate) async fn bind_channels(
        &self,
        request: mpsc::Sender<DispatchEvent>,
        response: mpsc::Receiver<ExecutionResult>,
    ) {
        *self.request.lock() = Some(request);
        *self.response.lock().await = Some(response);
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Unbinds the channel pair when a subscribe session ends.
    pub(crate) fn unbind_channels(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.request.lock() = None;
    }

    /// Returns a token that fires when the connection closes.
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[async_trait]
impl Connection for NodeConnection {
    async fn send(&self, event: DispatchEvent) -> Result<()> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }
        if !self.is_registered() {
            return Err(NodeError::NotRegistered);
        }

        let sender = self
            .request
            .lock()
            .clone()
            .ok_or(NodeError::NotConnected)?;

        tokio::select! {
            () = self.closed.cancelled() => Err(NodeError::Closed),
            sent = sender.send(event) => sent.map_err(|_| NodeError::Closed),
        }
    }

    async fn receive(&self) -> Result<ExecutionResult> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }
        if !self.is_registered() {
            return Err(NodeError::NotRegistered);
        }

        let mut guard = self.response.lock().await;
        let receiver = guard.as_mut().ok_or(NodeError::NotConnected)?;

        tokio::select! {
            () = self.closed.cancelled() => Err(NodeError::Closed),
            received = receiver.recv() => received.ok_or(NodeError::Closed),
        }
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
