//! Worker configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the pipeline worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Enable/disable the background loop.
    /// When disabled, the control API still serves the cursor and mirror.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Idle wait after every scan, including failed ones (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Cursor value at startup.
    #[serde(default = "default_initial_cursor")]
    pub initial_cursor: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60_000 // 1 minute
}

fn default_initial_cursor() -> u32 {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval(),
            initial_cursor: default_initial_cursor(),
        }
    }
}
