//! Control loop configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and retry configuration for a function controller's control loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopConfig {
    /// Pause between control-loop ticks.
    pub interval: Duration,

    /// Maximum number of empty scale-down sweeps before giving up.
    pub scale_down_retries: u32,

    /// Pause between scale-down sweeps.
    pub scale_down_retry_gap: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            scale_down_retries: 10,
            scale_down_retry_gap: Duration::from_millis(100),
        }
    }
}
