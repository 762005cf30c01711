//! Error types for triggers.

use thiserror::Error;

/// Trigger errors.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// No factory is registered under the given type name.
    #[error("unknown trigger type: {0}")]
    UnknownTriggerType(String),

    /// The factory rejected its options.
    #[error("failed to build trigger: {0}")]
    Build(String),

    /// Predicate evaluation failed.
    #[error(transparent)]
    Condition(#[from] crate::condition::ConditionError),
}

/// Result type for trigger operations.
pub type Result<T> = std::result::Result<T, TriggerError>;
