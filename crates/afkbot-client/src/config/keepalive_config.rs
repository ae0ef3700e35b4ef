use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the anti-idle movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Seconds between movement updates (default: 30, minimum 1)
    pub interval_secs: u64,

    /// Distance moved along X on each update, alternating sign (default: 0.15)
    pub step: f64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            step: 0.15,
        }
    }
}

impl KeepaliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
