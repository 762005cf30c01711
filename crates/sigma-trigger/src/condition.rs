//! Predicate evaluation seam.
//!
//! Trigger specs carry an opaque condition expression that is evaluated
//! against every event before dispatch. The expression language itself is
//! provided by an external evaluator behind [`ConditionEvaluator`]; the
//! built-in [`EventTypeCondition`] only understands event-type matching.

use std::collections::HashMap;

use thiserror::Error;

use sigma_proto::Event;

/// Predicate evaluation failure.
#[derive(Error, Debug)]
#[error("condition evaluation failed: {0}")]
pub struct ConditionError(pub String);

/// Evaluates trigger conditions against events.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluates `condition` against the event and the function parameters.
    ///
    /// An empty condition accepts every event.
    fn evaluate(
        &self,
        condition: &str,
        event: &Event,
        parameters: &HashMap<String, String>,
    ) -> Result<bool, ConditionError>;
}

/// Minimal built-in evaluator: the condition is an event-type match.
///
/// `""` and `"*"` accept everything, anything else must equal the event
/// type exactly. A parameter reference of the form `${name}` is resolved
/// from the function parameters before matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTypeCondition;

impl ConditionEvaluator for EventTypeCondition {
    fn evaluate(
        &self,
        condition: &str,
        event: &Event,
        parameters: &HashMap<String, String>,
    ) -> Result<bool, ConditionError> {
        if condition.is_empty() || condition == "*" {
            return Ok(true);
        }

        let expected = if let Some(name) = condition
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            parameters
                .get(name)
                .ok_or_else(|| ConditionError(format!("unknown parameter: {name}")))?
        } else {
            condition
        };

        Ok(expected == event.event_type)
    }
}
