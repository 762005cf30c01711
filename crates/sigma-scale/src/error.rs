//! Error types for autoscaling.

use thiserror::Error;

/// Autoscaling errors.
#[derive(Error, Debug)]
pub enum ScaleError {
    /// A policy with the same name is already attached.
    #[error("policy already attached: {0}")]
    AlreadyAttached(String),

    /// No attached policy has the given name.
    #[error("policy not found: {0}")]
    NotFound(String),

    /// No factory is registered under the given name.
    #[error("unknown scaling policy: {0}")]
    UnknownPolicy(String),

    /// A policy option is missing or malformed.
    #[error("invalid option {option:?} for policy {policy}: {reason}")]
    InvalidOption {
        policy: String,
        option: String,
        reason: String,
    },
}

/// Result type for autoscaling operations.
pub type Result<T> = std::result::Result<T, ScaleError>;
