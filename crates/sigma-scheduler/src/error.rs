//! Error types for the scheduler.

use thiserror::Error;

/// Scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// No function is registered under the identifier.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A function with the same identifier already exists.
    #[error("function already created: {0}")]
    DuplicateFunction(String),

    /// The submitted spec is not usable.
    #[error("invalid function spec: {0}")]
    InvalidSpec(&'static str),

    /// Function controller failure.
    #[error(transparent)]
    Function(#[from] sigma_function::FunctionError),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
