//! Per-function supervision.
//!
//! A [`FunctionController`] owns everything belonging to one function: the
//! map of node controllers, the live triggers built from the spec, the
//! optional autoscaler and the periodic control loop that keeps the node
//! set healthy. Event dispatch picks the first selectable node and forwards
//! to it.

mod config;
mod controller;
mod error;

pub use config::ControlLoopConfig;
pub use controller::{ControlLoopHook, FunctionController, FunctionControllerBuilder};
pub use error::{FunctionError, Result};
