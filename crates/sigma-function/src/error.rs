//! Error types for function controllers.

use sigma_proto::Urn;
use thiserror::Error;

/// Function controller errors.
#[derive(Error, Debug)]
pub enum FunctionError {
    /// The control loop is already running.
    #[error("function controller already running")]
    AlreadyRunning,

    /// The control loop has not been started.
    #[error("function controller not running")]
    NotRunning,

    /// No node is in a selectable state.
    #[error("no selectable nodes")]
    NoSelectableNodes,

    /// No node controller exists under the URN.
    #[error("unknown node: {0}")]
    UnknownNode(Urn),

    /// A control loop hook with the same name is already attached.
    #[error("control loop hook already attached: {0}")]
    HookAlreadyAttached(String),

    /// No control loop hook exists under the name.
    #[error("unknown control loop hook: {0}")]
    HookNotFound(String),

    /// An autoscaler was configured without a deployer.
    #[error("auto-scaling requires a node deployer")]
    MissingDeployer,

    /// Node plane failure.
    #[error(transparent)]
    Node(#[from] sigma_node::NodeError),

    /// Trigger failure.
    #[error(transparent)]
    Trigger(#[from] sigma_trigger::TriggerError),

    /// Autoscaling failure.
    #[error(transparent)]
    Scale(#[from] sigma_scale::ScaleError),
}

/// Result type for function controller operations.
pub type Result<T> = std::result::Result<T, FunctionError>;
