//! Wire protocol types for the Sigma worker protocol.
//!
//! This crate defines the messages exchanged between the node handler and
//! worker instances, the frame codec used to put them on a byte stream, and
//! the shared descriptor types (function specs, events, URNs) the rest of
//! the system passes around.
//!
//! # Wire Format
//!
//! All messages use an 8-byte frame header followed by an rkyv-serialised
//! payload:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Frame Header (8 bytes, fixed)               │
//! ├──────────────┬──────────────┬────────────────────────────┤
//! │  Version (2) │ Msg Type (2) │    Payload Length (4)      │
//! ├──────────────┴──────────────┴────────────────────────────┤
//! │                  rkyv-serialised message                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker protocol has two operations: a unary `Register` handshake
//! (authenticated with the `node-urn`/`node-secret` metadata pair) and a
//! bidirectional `Subscribe` stream carrying [`DispatchEvent`] frames out
//! and [`ExecutionResult`] frames back. Correlation between the two is by
//! the [`CorrelationId`] carried in the message body.

pub mod codec;
mod event;
mod error;
mod spec;
mod types;

pub use codec::{Codec, FrameHeader, MessageType, CURRENT_VERSION, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
pub use event::{
    DispatchEvent, Event, ExecutionOutcome, ExecutionResult, RegisterRequest, RegisterResponse,
};
pub use spec::{parameters_from_wire, parameters_to_wire, FunctionSpec, TriggerSpec};
pub use types::{CorrelationId, Urn};

/// Protocol version constants.
pub mod version {
    /// Current protocol version.
    pub const CURRENT: u16 = 1;

    /// Minimum supported protocol version.
    pub const MIN_SUPPORTED: u16 = 1;
}

/// Metadata keys workers must present when calling into the node handler.
pub mod metadata {
    /// Key carrying the node URN.
    pub const NODE_URN: &str = "node-urn";

    /// Key carrying the registration secret issued at slot reservation.
    pub const NODE_SECRET: &str = "node-secret";
}
