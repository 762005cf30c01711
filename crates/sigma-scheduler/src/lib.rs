//! Sigma scheduler - the top-level registry of function controllers.
//!
//! The scheduler is the management surface of the dispatch plane:
//!
//! - **Create** builds a function controller from a submitted spec
//!   (policies, triggers, deployer) and starts its control loop.
//! - **Dispatch** forwards an event to a function's selectable node.
//! - **Inspect**/**Functions** snapshot specs, node states and statistics.
//! - **Destroy** stops the control loop and tears down every node.
//!
//! State is in-memory only; functions do not survive a process restart.

mod config;
mod error;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use scheduler::{FunctionRegistration, NodeInstance, Scheduler};
