//! Node lifecycle and dispatch plane.
//!
//! One worker instance ("node") is owned by a chain of three objects:
//!
//! - [`NodeConnection`] holds the worker's bidirectional message stream,
//!   its registration handshake state and the close signal.
//! - [`Router`] layers correlated request/reply on top of the connection so
//!   many dispatches can be in flight at once.
//! - [`NodeController`] binds the router to a launcher [`Instance`], tracks
//!   node state and statistics, and executes individual dispatches.
//!
//! The [`NodeHandler`] is the server endpoint workers connect to; the
//! [`NodeDeployer`] drives the full bring-up: reserve a slot, launch a
//! worker, wait for its registration, hand back a controller.
//!
//! [`Instance`]: sigma_launcher::Instance

mod connection;
mod controller;
mod deployer;
mod error;
mod handler;
mod router;
mod state;
pub mod wire;
pub mod worker;

pub use connection::{Connection, NodeConnection};
pub use controller::{DestroyHook, NodeController};
pub use deployer::{Deploy, DeployConfig, NodeDeployer};
pub use error::{NodeError, Result};
pub use handler::{NodeHandler, SUBSCRIBE_CHANNEL_DEPTH};
pub use router::Router;
pub use state::{NodeState, NodeStats};
