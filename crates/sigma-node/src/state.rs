//! Node state and statistics.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// The current state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// The node is healthy and may be selected for dispatch.
    Active,

    /// An invocation is currently in flight.
    Running,

    /// The node is preserved but must not be selected.
    Disabled,

    /// The node failed and will be reaped at the next control-loop tick.
    Unhealthy,
}

impl NodeState {
    /// Returns true if the state allows the node to be selected for
    /// event dispatching.
    #[must_use]
    pub const fn can_select(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true unless the node is marked unhealthy.
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Running => "running",
            Self::Disabled => "disabled",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

/// Per-node invocation statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Time the node was created.
    pub created_at: SystemTime,

    /// Start time of the most recent invocation.
    pub last_invocation: Option<SystemTime>,

    /// Total number of invocations.
    pub invocations: u64,

    /// Sum of wall-clock dispatch-to-reply durations.
    pub total_exec_time: Duration,

    /// Mean execution time (total / invocations).
    pub mean_exec_time: Duration,
}

impl NodeStats {
    /// Creates fresh statistics for a node created now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            created_at: SystemTime::now(),
            last_invocation: None,
            invocations: 0,
            total_exec_time: Duration::ZERO,
            mean_exec_time: Duration::ZERO,
        }
    }

    /// Records a completed invocation.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn record_invocation(&mut self, started_at: SystemTime, exec_time: Duration) {
        self.last_invocation = Some(started_at);
        self.invocations += 1;
        self.total_exec_time += exec_time;
        self.mean_exec_time = self.total_exec_time / self.invocations as u32;
    }
}

impl Default for NodeStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_is_selectable() {
        assert!(NodeState::Active.can_select());
        assert!(!NodeState::Running.can_select());
        assert!(!NodeState::Disabled.can_select());
        assert!(!NodeState::Unhealthy.can_select());
    }

    #[test]
    fn only_unhealthy_is_unhealthy() {
        assert!(NodeState::Active.is_healthy());
        assert!(NodeState::Running.is_healthy());
        assert!(NodeState::Disabled.is_healthy());
        assert!(!NodeState::Unhealthy.is_healthy());
    }

    #[test]
    fn stats_mean_tracks_total() {
        let mut stats = NodeStats::new();
        let start = SystemTime::now();

        stats.record_invocation(start, Duration::from_millis(100));
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.mean_exec_time, Duration::from_millis(100));

        stats.record_invocation(start, Duration::from_millis(300));
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.total_exec_time, Duration::from_millis(400));
        assert_eq!(stats.mean_exec_time, Duration::from_millis(200));
        assert_eq!(stats.last_invocation, Some(start));
    }
}
