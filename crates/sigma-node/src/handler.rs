//! Server endpoint workers connect to.
//!
//! The handler is the authentication boundary of the node plane: every slot
//! is pre-provisioned with a random secret by the deployer, and a worker
//! never reaches its connection without presenting the matching
//! `node-urn`/`node-secret` metadata pair.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sigma_proto::{
    metadata, parameters_to_wire, ExecutionResult, FunctionSpec, MessageType, RegisterRequest,
    RegisterResponse, Urn,
};

use crate::connection::{Connection, NodeConnection};
use crate::error::{NodeError, Result};
use crate::wire;

/// Buffering depth of the subscribe-session channel pair.
///
/// Senders block beyond this, which throttles producers naturally.
pub const SUBSCRIBE_CHANNEL_DEPTH: usize = 100;

/// Matches incoming worker connections to pre-provisioned slots and splices
/// their streams onto the owning node connection.
#[derive(Default)]
pub struct NodeHandler {
    conns: RwLock<HashMap<Urn, Arc<NodeConnection>>>,
}

impl NodeHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-provisions a slot for a worker that is about to be launched.
    ///
    /// Fails with [`NodeError::UrnCollision`] if the URN is taken under a
    /// different secret and [`NodeError::DuplicateReservation`] if the same
    /// pair is reserved twice.
    pub fn reserve(
        &self,
        urn: Urn,
        secret: impl Into<String>,
        spec: FunctionSpec,
    ) -> Result<Arc<NodeConnection>> {
        let secret = secret.into();
        let mut conns = self.conns.write();

        if let Some(existing) = conns.get(&urn) {
            if existing.secret_matches(&secret) {
                return Err(NodeError::DuplicateReservation(urn));
            }
            return Err(NodeError::UrnCollision(urn));
        }

        let conn = Arc::new(NodeConnection::new(urn.clone(), secret, spec));
        conns.insert(urn, conn.clone());

        Ok(conn)
    }

    /// Removes a slot and closes its connection.
    pub fn release(&self, urn: &Urn) -> Result<()> {
        let conn = self
            .conns
            .write()
            .remove(urn)
            .ok_or_else(|| NodeError::UnknownNode(urn.clone()))?;

        conn.close();
        debug!(urn = %urn, "slot released");
        Ok(())
    }

    /// Handles a worker's registration handshake.
    ///
    /// On success the slot is marked registered and the worker receives its
    /// code blob and parameters.
    pub fn register(
        &self,
        meta: &[(String, String)],
        request: &RegisterRequest,
    ) -> Result<RegisterResponse> {
        let (urn, secret) = node_auth(meta)?;

        if request.node_type.is_empty() {
            return Err(NodeError::InvalidRequest("missing node type"));
        }

        let conn = self.authenticated(&urn, &secret)?;

        if conn.is_registered() {
            return Err(NodeError::AlreadyRegistered);
        }
        if conn.is_closed() {
            return Err(NodeError::Closed);
        }

        conn.mark_registered();
        info!(urn = %urn, node_type = %request.node_type, "node registered");

        Ok(RegisterResponse {
            urn: urn.to_string(),
            content: conn.spec().content.clone(),
            parameters: parameters_to_wire(&conn.spec().parameters),
        })
    }

    /// Serves a worker's bidirectional subscribe stream.
    ///
    /// Requires a registered, not-yet-connected slot. Binds a bounded
    /// channel pair to the connection, drains execution results from the
    /// wire and writes dispatch events onto it. Returns - and unbinds -
    /// when the wire fails, the reader exits, or the connection is closed.
    pub async fn subscribe<S>(&self, meta: &[(String, String)], stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (urn, secret) = node_auth(meta)?;
        let conn = self.authenticated(&urn, &secret)?;

        if !conn.is_registered() {
            return Err(NodeError::NotRegistered);
        }
        if conn.is_connected() {
            return Err(NodeError::AlreadyConnected);
        }
        if conn.is_closed() {
            return Err(NodeError::Closed);
        }

        let (request_tx, mut request_rx) = mpsc::channel(SUBSCRIBE_CHANNEL_DEPTH);
        let (response_tx, response_rx) = mpsc::channel::<ExecutionResult>(SUBSCRIBE_CHANNEL_DEPTH);
        conn.bind_channels(request_tx, response_rx).await;
        info!(urn = %urn, "worker stream connected");

        let (mut read_half, mut write_half) = tokio::io::split(stream);

        let reader_conn = conn.clone();
        let reader_urn = urn.clone();
        let mut reader = tokio::spawn(async move {
            loop {
                match wire::read_message(&mut read_half).await {
                    Ok((MessageType::Result, payload)) => {
                        let result = match wire::decode_result(&payload) {
                            Ok(result) => result,
                            Err(err) => {
                                warn!(urn = %reader_urn, error = %err, "dropping malformed result");
                                continue;
                            }
                        };
                        if reader_conn.is_closed() {
                            return;
                        }
                        if response_tx.send(result).await.is_err() {
                            return;
                        }
                    }
                    Ok((message_type, _)) => {
                        warn!(urn = %reader_urn, ?message_type, "unexpected frame on subscribe stream");
                    }
                    Err(err) => {
                        debug!(urn = %reader_urn, error = %err, "worker stream reader exiting");
                        return;
                    }
                }
            }
        });

        let closed = conn.closed_token();
        let result = loop {
            tokio::select! {
                () = closed.cancelled() => break Err(NodeError::Closed),
                _ = &mut reader => break Err(NodeError::Closed),
                event = request_rx.recv() => match event {
                    Some(event) => {
                        if let Err(err) = wire::write_dispatch(&mut write_half, &event).await {
                            warn!(urn = %urn, error = %err, "worker stream write failed");
                            break Err(err.into());
                        }
                    }
                    None => break Err(NodeError::Closed),
                }
            }
        };

        reader.abort();
        conn.unbind_channels();
        info!(urn = %urn, "worker stream disconnected");

        result
    }

    fn authenticated(&self, urn: &Urn, secret: &str) -> Result<Arc<NodeConnection>> {
        let conns = self.conns.read();
        let conn = conns
            .get(urn)
            .ok_or_else(|| NodeError::UnknownNode(urn.clone()))?;

        if !conn.secret_matches(secret) {
            return Err(NodeError::InvalidSecret);
        }

        Ok(conn.clone())
    }
}

/// Extracts the worker auth pair from call metadata.
fn node_auth(meta: &[(String, String)]) -> Result<(Urn, String)> {
    let urn = meta
        .iter()
        .find(|(key, _)| key == metadata::NODE_URN)
        .map(|(_, value)| value.as_str())
        .ok_or(NodeError::InvalidMetadata("missing node-urn"))?;
    if urn.is_empty() {
        return Err(NodeError::InvalidMetadata("empty node-urn"));
    }

    let secret = meta
        .iter()
        .find(|(key, _)| key == metadata::NODE_SECRET)
        .map(|(_, value)| value.as_str())
        .ok_or(NodeError::InvalidMetadata("missing node-secret"))?;
    if secret.is_empty() {
        return Err(NodeError::InvalidMetadata("empty node-secret"));
    }

    Ok((Urn::new(urn), secret.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigma_proto::{CorrelationId, DispatchEvent};

    fn spec() -> FunctionSpec {
        FunctionSpec {
            id: "greet".to_owned(),
            runtime: "test".to_owned(),
            content: b"function code".to_vec(),
            parameters: HashMap::from([("region".to_owned(), "eu".to_owned())]),
            ..FunctionSpec::default()
        }
    }

    fn meta(urn: &str, secret: &str) -> Vec<(String, String)> {
        vec![
            (metadata::NODE_URN.to_owned(), urn.to_owned()),
            (metadata::NODE_SECRET.to_owned(), secret.to_owned()),
        ]
    }

    fn request() -> RegisterRequest {
        RegisterRequest {
            urn: "sigma:node:greet/1".to_owned(),
            node_type: "test".to_owned(),
        }
    }

    #[tokio::test]
    async fn reserve_conflicts() {
        let handler = NodeHandler::new();
        let urn = Urn::new("sigma:node:greet/1");

        handler.reserve(urn.clone(), "s1", spec()).unwrap();

        assert!(matches!(
            handler.reserve(urn.clone(), "s2", spec()),
            Err(NodeError::UrnCollision(_))
        ));
        assert!(matches!(
            handler.reserve(urn.clone(), "s1", spec()),
            Err(NodeError::DuplicateReservation(_))
        ));
    }

    #[tokio::test]
    async fn register_happy_path() {
        let handler = NodeHandler::new();
        let urn = Urn::new("sigma:node:greet/1");
        let conn = handler.reserve(urn.clone(), "s1", spec()).unwrap();

        let response = handler
            .register(&meta("sigma:node:greet/1", "s1"), &request())
            .unwrap();

        assert!(conn.is_registered());
        assert_eq!(response.urn, "sigma:node:greet/1");
        assert_eq!(response.content, b"function code");
        assert_eq!(
            response.parameters,
            vec![("region".to_owned(), "eu".to_owned())]
        );
    }

    #[tokio::test]
    async fn register_rejects_bad_credentials() {
        let handler = NodeHandler::new();
        let urn = Urn::new("sigma:node:greet/1");
        let conn = handler.reserve(urn, "s1", spec()).unwrap();

        assert!(matches!(
            handler.register(&meta("sigma:node:greet/1", "wrong"), &request()),
            Err(NodeError::InvalidSecret)
        ));
        // The slot is untouched by the failed attempt.
        assert!(!conn.is_registered());

        assert!(matches!(
            handler.register(&meta("sigma:node:other/1", "s1"), &request()),
            Err(NodeError::UnknownNode(_))
        ));
        assert!(matches!(
            handler.register(&[], &request()),
            Err(NodeError::InvalidMetadata(_))
        ));
    }

    #[tokio::test]
    async fn register_is_single_shot() {
        let handler = NodeHandler::new();
        handler
            .reserve(Urn::new("sigma:node:greet/1"), "s1", spec())
            .unwrap();

        let m = meta("sigma:node:greet/1", "s1");
        handler.register(&m, &request()).unwrap();

        assert!(matches!(
            handler.register(&m, &request()),
            Err(NodeError::AlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn subscribe_requires_registration() {
        let handler = NodeHandler::new();
        handler
            .reserve(Urn::new("sigma:node:greet/1"), "s1", spec())
            .unwrap();

        let (client, _server) = tokio::io::duplex(4096);
        let result = handler
            .subscribe(&meta("sigma:node:greet/1", "s1"), client)
            .await;

        assert!(matches!(result, Err(NodeError::NotRegistered)));
    }

    #[tokio::test]
    async fn subscribe_splices_stream_to_connection() {
        let handler = Arc::new(NodeHandler::new());
        let urn = Urn::new("sigma:node:greet/1");
        let conn = handler.reserve(urn.clone(), "s1", spec()).unwrap();

        let m = meta("sigma:node:greet/1", "s1");
        handler.register(&m, &request()).unwrap();

        let (server_stream, worker_stream) = tokio::io::duplex(4096);

        let session = {
            let handler = handler.clone();
            let m = m.clone();
            tokio::spawn(async move { handler.subscribe(&m, server_stream).await })
        };

        // Echo worker: reads one dispatch event, replies with its payload.
        let worker = tokio::spawn(async move {
            let (mut read_half, mut write_half) = tokio::io::split(worker_stream);
            let (message_type, payload) = wire::read_message(&mut read_half).await.unwrap();
            assert_eq!(message_type, MessageType::Dispatch);

            let event = wire::decode_dispatch(&payload).unwrap();
            let reply = ExecutionResult::data(event.id, event.payload);
            wire::write_result(&mut write_half, &reply).await.unwrap();
        });

        // Wait until the session has bound the channels.
        while !conn.is_connected() {
            tokio::task::yield_now().await;
        }

        let event = DispatchEvent {
            id: CorrelationId::new(),
            urn: urn.to_string(),
            payload: b"ping".to_vec(),
        };
        conn.send(event.clone()).await.unwrap();

        let result = conn.receive().await.unwrap();
        assert_eq!(result.id, event.id);
        assert_eq!(
            result.outcome,
            sigma_proto::ExecutionOutcome::Data(b"ping".to_vec())
        );

        worker.await.unwrap();

        // Releasing the slot closes the connection and ends the session.
        handler.release(&urn).unwrap();
        assert!(matches!(session.await.unwrap(), Err(NodeError::Closed)));

        assert!(matches!(
            handler.release(&urn),
            Err(NodeError::UnknownNode(_))
        ));
    }

    #[tokio::test]
    async fn subscribe_rejects_second_stream() {
        let handler = Arc::new(NodeHandler::new());
        let urn = Urn::new("sigma:node:greet/1");
        let conn = handler.reserve(urn, "s1", spec()).unwrap();

        let m = meta("sigma:node:greet/1", "s1");
        handler.register(&m, &request()).unwrap();

        let (server_stream, _worker_stream) = tokio::io::duplex(4096);
        let session = {
            let handler = handler.clone();
            let m = m.clone();
            tokio::spawn(async move { handler.subscribe(&m, server_stream).await })
        };

        while !conn.is_connected() {
            tokio::task::yield_now().await;
        }

        let (second_stream, _other_end) = tokio::io::duplex(4096);
        assert!(matches!(
            handler.subscribe(&m, second_stream).await,
            Err(NodeError::AlreadyConnected)
        ));

        conn.close();
        assert!(matches!(session.await.unwrap(), Err(NodeError::Closed)));
    }
}
