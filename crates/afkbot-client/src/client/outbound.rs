use std::sync::Arc;

use afkbot_events::OutboundPacket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::client::session::SessionState;

/// Chat commands whose arguments must not end up in logs
const SECRET_COMMANDS: [&str; 2] = ["/login", "/register"];

/// Producer side of a cycle's chat queue (FIFO, unbounded)
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl OutboundQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a chat line. Returns false when the cycle's worker is gone.
    pub fn push(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        match self.tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                warn!(target: "chat", "Outbound queue closed, dropping: {}", redact(&message));
                false
            }
        }
    }
}

/// Hide the arguments of credential-bearing commands.
pub fn redact(message: &str) -> String {
    for command in SECRET_COMMANDS {
        if let Some(rest) = message.strip_prefix(command) {
            if rest.is_empty() || rest.starts_with(' ') {
                return format!("{} <redacted>", command);
            }
        }
    }
    message.to_string()
}

/// Send one chat line through the session's current handle.
///
/// Never fails: a missing handle or a transport error is logged and the
/// message is dropped.
pub async fn send_chat(session: &SessionState, message: String) -> bool {
    let Some(handle) = session.handle() else {
        warn!(target: "chat", "No active connection yet, message not sent: {}", redact(&message));
        return false;
    };

    let shown = redact(&message);
    match handle.send(OutboundPacket::chat(message)).await {
        Ok(()) => {
            info!(target: "chat", "Message sent: {}", shown);
            true
        }
        Err(e) => {
            error!(target: "chat", "Could not send message '{}': {}", shown, e);
            false
        }
    }
}

/// Drain the chat queue one message at a time until the cycle stops.
pub async fn run_outbound_worker(
    session: Arc<SessionState>,
    mut queue: mpsc::UnboundedReceiver<String>,
    mut teardown: watch::Receiver<bool>,
) {
    debug!(target: "chat", "Outbound worker started");

    loop {
        tokio::select! {
            biased;
            _ = session.stopped() => break,
            _ = teardown.changed() => break,
            message = queue.recv() => match message {
                Some(message) => {
                    send_chat(&session, message).await;
                }
                None => break,
            },
        }
    }

    debug!(target: "chat", "Outbound worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_credentials() {
        assert_eq!(redact("/login hunter2"), "/login <redacted>");
        assert_eq!(redact("/register a a"), "/register <redacted>");
        assert_eq!(redact("/loginfo"), "/loginfo");
        assert_eq!(redact("hello"), "hello");
    }

    #[test]
    fn test_push_after_receiver_dropped() {
        let (queue, rx) = OutboundQueue::channel();
        assert!(queue.push("first"));
        drop(rx);
        assert!(!queue.push("second"));
    }

    #[tokio::test]
    async fn test_send_without_handle_is_not_fatal() {
        let session = SessionState::new();
        assert!(!send_chat(&session, "hello".to_string()).await);
    }
}
