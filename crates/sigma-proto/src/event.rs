//! Event and worker protocol message types.

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::CorrelationId;

/// An event that triggers the execution of a function.
///
/// Events are the domain-side input: a type tag plus an opaque payload.
/// The dispatch plane never inspects the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event type tag, matched against trigger conditions.
    pub event_type: String,

    /// Opaque event payload handed to the worker.
    pub payload: Vec<u8>,
}

impl Event {
    /// Creates a new event from a type tag and payload.
    pub fn new(event_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }
}

/// A dispatch event sent to a worker over the subscribe stream.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Correlation id; the worker echoes it in the [`ExecutionResult`].
    pub id: CorrelationId,

    /// URN of the node the event is dispatched to.
    pub urn: String,

    /// Opaque event payload.
    pub payload: Vec<u8>,
}

/// The worker's reply to a [`DispatchEvent`].
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Correlation id echoed from the dispatch event.
    pub id: CorrelationId,

    /// Execution outcome.
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    /// Creates a successful result carrying the function output.
    #[must_use]
    pub fn data(id: CorrelationId, data: Vec<u8>) -> Self {
        Self {
            id,
            outcome: ExecutionOutcome::Data(data),
        }
    }

    /// Creates a failed result carrying the worker-side error message.
    pub fn error(id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: ExecutionOutcome::Error(message.into()),
        }
    }
}

/// Tagged outcome of a single function execution.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Execution succeeded; the bytes are the function output.
    Data(Vec<u8>),

    /// Execution failed inside the worker.
    Error(String),
}

/// Registration handshake request sent by a worker.
///
/// The caller must additionally present the `node-urn`/`node-secret`
/// metadata pair; the request body only names the worker's execution type.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    /// URN the worker believes it was launched as.
    pub urn: String,

    /// Execution type of the worker.
    pub node_type: String,
}

/// Registration handshake response.
///
/// Carries everything the worker needs to start serving: its confirmed URN,
/// the function code blob, and the function parameters.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    /// Confirmed node URN.
    pub urn: String,

    /// Function code blob.
    pub content: Vec<u8>,

    /// Function parameters as wire pairs.
    pub parameters: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_result_constructors() {
        let id = CorrelationId::new();

        let ok = ExecutionResult::data(id, b"out".to_vec());
        assert_eq!(ok.outcome, ExecutionOutcome::Data(b"out".to_vec()));

        let err = ExecutionResult::error(id, "boom");
        assert_eq!(err.outcome, ExecutionOutcome::Error("boom".to_owned()));
        assert_eq!(err.id, id);
    }

    #[test]
    fn event_construction() {
        let event = Event::new("sensor.reading", b"42".to_vec());
        assert_eq!(event.event_type, "sensor.reading");
        assert_eq!(event.payload, b"42");
    }
}
