//! Correlated request/reply multiplexing over one node connection.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sigma_proto::{CorrelationId, DispatchEvent, ExecutionResult};

use crate::connection::Connection;
use crate::error::{NodeError, Result};

/// Delay before retrying after a receive error that predates close.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(10);

type RouteTable = DashMap<CorrelationId, oneshot::Sender<ExecutionResult>>;

/// Multiplexes many concurrent in-flight dispatches over one connection.
///
/// Every dispatch is tagged with a fresh [`CorrelationId`]; a background
/// reader matches replies back to their waiting callers. Replies may arrive
/// in any order.
pub struct Router {
    conn: Arc<dyn Connection>,
    routes: Arc<RouteTable>,
    closed: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Creates a router over the connection and starts its reply reader.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        let routes: Arc<RouteTable> = Arc::new(DashMap::new());
        let closed = CancellationToken::new();

        let reader = tokio::spawn(read_loop(conn.clone(), routes.clone(), closed.clone()));

        Self {
            conn,
            routes,
            closed,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Returns true once the underlying connection completed its handshake.
    pub fn is_registered(&self) -> bool {
        self.conn.is_registered()
    }

    /// Returns true while a worker stream is bound to the connection.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Dispatches an event and waits for the matching reply.
    ///
    /// The event's correlation id is overwritten with a fresh one. The id is
    /// registered in the routing table before the send and deregistered on
    /// every exit path; a reply arriving after the caller has gone away is
    /// dropped.
    pub async fn dispatch(&self, mut event: DispatchEvent) -> Result<ExecutionResult> {
        if self.closed.is_cancelled() {
            return Err(NodeError::Closed);
        }

        let id = CorrelationId::new();
        event.id = id;

        let (sink, reply) = oneshot::channel();
        self.routes.insert(id, sink);
        let _route = RouteGuard {
            routes: &self.routes,
            id,
        };

        self.conn.send(event).await?;

        tokio::select! {
            () = self.closed.cancelled() => Err(NodeError::Closed),
            received = reply => received.map_err(|_| NodeError::Closed),
        }
    }

    /// Closes the router: stops the reply reader, waits for it, then closes
    /// the underlying connection.
    ///
    /// A second call returns [`NodeError::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(NodeError::AlreadyClosed);
        }
        self.closed.cancel();

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }

        self.conn.close();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pending_routes(&self) -> usize {
        self.routes.len()
    }
}

/// Removes a routing-table entry when the dispatch call returns or is
/// cancelled.
struct RouteGuard<'a> {
    routes: &'a RouteTable,
    id: CorrelationId,
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        self.routes.remove(&self.id);
    }
}

async fn read_loop(conn: Arc<dyn Connection>, routes: Arc<RouteTable>, closed: CancellationToken) {
    loop {
        tokio::select! {
            () = closed.cancelled() => return,
            received = conn.receive() => match received {
                Ok(reply) => {
                    // One-shot delivery; a missing sink means the caller
                    // cancelled and the reply is dropped.
                    if let Some((_, sink)) = routes.remove(&reply.id) {
                        let _ = sink.send(reply);
                    }
                }
                Err(err) => {
                    debug!(error = %err, "receive failed, retrying");
                    tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                }
            }
        }
    }
}
