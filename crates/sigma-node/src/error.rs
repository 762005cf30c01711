//! Error types for the node plane.

use sigma_proto::Urn;
use thiserror::Error;

/// Node plane errors.
#[derive(Error, Debug)]
pub enum NodeError {
    /// The connection handshake has not completed.
    #[error("node not registered")]
    NotRegistered,

    /// No worker stream is bound to the connection.
    #[error("node not connected")]
    NotConnected,

    /// The connection or router has been closed.
    #[error("connection closed")]
    Closed,

    /// Close was called on an already-closed router.
    #[error("already closed")]
    AlreadyClosed,

    /// The worker already completed its registration handshake.
    #[error("node already registered")]
    AlreadyRegistered,

    /// A worker stream is already bound to the connection.
    #[error("node already connected")]
    AlreadyConnected,

    /// No slot exists for the URN.
    #[error("unknown node: {0}")]
    UnknownNode(Urn),

    /// A slot for the URN already exists under a different secret.
    #[error("URN collision: {0}")]
    UrnCollision(Urn),

    /// The identical (URN, secret) pair was reserved twice.
    #[error("duplicate reservation: {0}")]
    DuplicateReservation(Urn),

    /// The presented secret does not match the reserved slot.
    #[error("invalid registration secret")]
    InvalidSecret,

    /// Worker call metadata is missing or malformed.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(&'static str),

    /// The registration request body is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// The worker did not register within the deploy timeout.
    #[error("deploy timed out waiting for registration of {0}")]
    DeployTimeout(Urn),

    /// Launcher failure.
    #[error(transparent)]
    Launch(#[from] sigma_launcher::LaunchError),

    /// The worker reported an execution failure.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Wire protocol failure.
    #[error(transparent)]
    Protocol(#[from] sigma_proto::ProtocolError),
}

/// Result type for node plane operations.
pub type Result<T> = std::result::Result<T, NodeError>;
