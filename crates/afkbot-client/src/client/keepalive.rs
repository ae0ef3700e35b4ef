use std::sync::Arc;

use afkbot_events::{OutboundPacket, Position};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::client::session::SessionState;
use crate::config::KeepaliveConfig;

/// Periodically nudges the player along X so the server does not kick us
/// for idling. Movement goes straight to the transport, not through the
/// chat queue.
pub struct KeepaliveWorker {
    session: Arc<SessionState>,
    config: KeepaliveConfig,
}

impl KeepaliveWorker {
    pub fn new(session: Arc<SessionState>, config: KeepaliveConfig) -> Self {
        Self { session, config }
    }

    /// Tick every interval until the cycle is torn down.
    ///
    /// A stopped session only skips ticks; the loop ends on `teardown`.
    pub async fn run(self, mut teardown: watch::Receiver<bool>) {
        let interval = self.config.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(target: "keepalive", "Keepalive worker started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = teardown.changed() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        debug!(target: "keepalive", "Keepalive worker stopped");
    }

    /// Run one keepalive step. Returns the position that was submitted, if any.
    pub async fn tick(&self) -> Option<Position> {
        if !self.session.is_running() {
            debug!(target: "keepalive", "Session stopped, skipping movement");
            return None;
        }

        // Check the handle before touching the sign so a skipped tick does not
        // shift the oscillation
        let Some(handle) = self.session.handle() else {
            debug!(target: "keepalive", "No connection, skipping movement");
            return None;
        };

        let Some(step) = self.session.next_keepalive_move(self.config.step) else {
            debug!(target: "keepalive", "No position received yet, skipping movement");
            return None;
        };

        match handle.send(OutboundPacket::position(step.position, true)).await {
            Ok(()) => {
                info!(
                    target: "keepalive",
                    "Anti-idle movement sent (offset {:+.2} on X)",
                    step.offset
                );
            }
            Err(e) => {
                error!(target: "keepalive", "Could not send anti-idle movement: {}", e);
            }
        }

        Some(step.position)
    }
}
