use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the reconnect backoff
///
/// The policy is two-tier on purpose: a short delay after an ordinary
/// disconnect, a long one when the disconnect reason contains the throttle
/// marker. There is no attempt cap and no exponential growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay in seconds after an ordinary disconnect (default: 120)
    pub short_delay_secs: u64,

    /// Delay in seconds when the server is throttling us (default: 600)
    pub long_delay_secs: u64,

    /// Case-insensitive substring of a disconnect reason that selects the long delay
    pub throttle_marker: String,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            short_delay_secs: 2 * 60,
            long_delay_secs: 10 * 60,
            throttle_marker: "throttle".to_string(),
        }
    }
}

impl ReconnectConfig {
    pub fn short_delay(&self) -> Duration {
        Duration::from_secs(self.short_delay_secs)
    }

    pub fn long_delay(&self) -> Duration {
        Duration::from_secs(self.long_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
        }
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
