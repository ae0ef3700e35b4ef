use std::io::BufRead;

use afkbot_client::client::outbound::redact;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::orchestrator::ActiveSession;

/// Forwards operator-typed lines to whichever cycle is currently live
pub struct ConsoleBridge {
    active: watch::Receiver<Option<ActiveSession>>,
}

impl ConsoleBridge {
    pub fn new(active: watch::Receiver<Option<ActiveSession>>) -> Self {
        Self { active }
    }

    /// Read lines until end of input. EOF only ends the bridge, never the bot.
    ///
    /// Reads block, so this belongs on its own thread rather than on the
    /// runtime; a read that never returns must not hold up shutdown.
    pub fn run<R: BufRead>(self, input: R) {
        debug!(target: "console", "Console bridge started");

        for line in input.lines() {
            match line {
                Ok(line) => {
                    self.forward(&line);
                }
                Err(e) => {
                    error!(target: "console", "Error reading console input: {}", e);
                    return;
                }
            }
        }
        info!(target: "console", "Console input closed");
    }

    /// Queue one line on the live cycle. Returns whether it was queued.
    pub fn forward(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        let active = self.active.borrow().clone();
        match active {
            Some(active) if active.session.is_running() => {
                debug!(target: "console", "Queued: {}", redact(line));
                active.outbound.push(line)
            }
            _ => {
                warn!(target: "console", "No active session, dropping input: {}", redact(line));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use afkbot_client::client::{OutboundQueue, SessionState};
    use tokio::sync::mpsc;

    use super::*;

    fn live_cycle() -> (
        watch::Sender<Option<ActiveSession>>,
        Arc<SessionState>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let session = Arc::new(SessionState::new());
        let (outbound, rx) = OutboundQueue::channel();
        let (tx, _) = watch::channel(Some(ActiveSession {
            session: session.clone(),
            outbound,
        }));
        (tx, session, rx)
    }

    #[test]
    fn test_lines_are_trimmed_and_blank_lines_skipped() {
        let (active, _session, mut rx) = live_cycle();
        let bridge = ConsoleBridge::new(active.subscribe());

        bridge.run(&b"  hello there \n\n   \n/login x\n"[..]);

        assert_eq!(rx.try_recv().unwrap(), "hello there");
        assert_eq!(rx.try_recv().unwrap(), "/login x");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bridge_runs_on_its_own_thread() {
        let (active, _session, mut rx) = live_cycle();
        let bridge = ConsoleBridge::new(active.subscribe());

        let reader = std::thread::spawn(move || bridge.run(&b"from a thread\n"[..]));
        reader.join().unwrap();

        assert_eq!(rx.try_recv().unwrap(), "from a thread");
    }

    #[test]
    fn test_input_without_cycle_is_dropped() {
        let (active, _) = watch::channel(None);
        let bridge = ConsoleBridge::new(active.subscribe());
        assert!(!bridge.forward("hello"));
    }

    #[test]
    fn test_input_for_stopped_cycle_is_dropped() {
        let (active, session, mut rx) = live_cycle();
        let bridge = ConsoleBridge::new(active.subscribe());

        session.stop();
        assert!(!bridge.forward("hello"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bridge_follows_the_current_cycle() {
        let (active, _old, mut old_rx) = live_cycle();
        let bridge = ConsoleBridge::new(active.subscribe());
        assert!(bridge.forward("first"));

        let session = Arc::new(SessionState::new());
        let (outbound, mut new_rx) = OutboundQueue::channel();
        active.send_replace(Some(ActiveSession { session, outbound }));
        assert!(bridge.forward("second"));

        assert_eq!(old_rx.try_recv().unwrap(), "first");
        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap(), "second");
    }
}
