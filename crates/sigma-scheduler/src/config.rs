//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration applied to every function controller the scheduler
/// creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Control-loop interval for function controllers.
    pub control_loop_interval: Duration,

    /// Maximum number of empty scale-down sweeps before giving up.
    pub scale_down_retries: u32,

    /// Pause between scale-down sweeps.
    pub scale_down_retry_gap: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            control_loop_interval: Duration::from_secs(10),
            scale_down_retries: 10,
            scale_down_retry_gap: Duration::from_millis(100),
        }
    }
}
