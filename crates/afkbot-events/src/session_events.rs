use serde::{Deserialize, Serialize};

/// Lifecycle events published by the runner, one cycle at a time
///
/// `cycle` counts connection attempts starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A new session cycle is about to connect
    ConnectingStarted { cycle: u64, address: String },
    /// The transport reported a live session
    Connected { cycle: u64 },
    /// The transport could not establish a session
    ConnectFailed { cycle: u64, reason: String },
    /// The cycle ended. `cause` is the reason used for backoff, which may be
    /// carried over from an earlier cycle
    Disconnected { cycle: u64, cause: String },
    /// The next cycle will start after `delay_secs`
    ReconnectScheduled {
        cycle: u64,
        delay_secs: u64,
        cause: String,
        throttled: bool,
    },
}
