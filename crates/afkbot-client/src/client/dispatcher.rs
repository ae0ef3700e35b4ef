use std::sync::Arc;

use afkbot_events::{ClientEvent, Position};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::outbound::OutboundQueue;
use crate::client::reason::extract_reason;
use crate::client::session::{Credential, SessionState};

/// Which authentication prompt a server chat line contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPrompt {
    Register,
    Login,
}

impl AuthPrompt {
    /// Detect a prompt in a chat line. Registration wins over login.
    pub fn detect(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("/register") || lower.contains("registr") {
            Some(AuthPrompt::Register)
        } else if lower.contains("/login") || lower.contains("log") {
            Some(AuthPrompt::Login)
        } else {
            None
        }
    }

    /// The chat command answering this prompt
    pub fn reply(self, credential: &Credential) -> String {
        let secret = credential.expose();
        match self {
            AuthPrompt::Register => format!("/register {} {}", secret, secret),
            AuthPrompt::Login => format!("/login {}", secret),
        }
    }
}

/// Routes inbound transport events to the session of one cycle
pub struct EventDispatcher {
    session: Arc<SessionState>,
    credential: Credential,
    outbound: OutboundQueue,
}

impl EventDispatcher {
    pub fn new(
        session: Arc<SessionState>,
        credential: Credential,
        outbound: OutboundQueue,
    ) -> Self {
        Self {
            session,
            credential,
            outbound,
        }
    }

    pub fn handle_event(&self, event: ClientEvent) {
        debug!(target: "session", "Dispatching {}", event.kind());
        match event {
            ClientEvent::JoinGame => self.on_join(),
            ClientEvent::Disconnect { payload } => self.on_disconnect(payload.as_deref()),
            ClientEvent::ChatMessage { payload } => self.on_chat(payload.as_deref()),
            ClientEvent::PositionAndLook(position) => self.on_position(position),
        }
    }

    fn on_join(&self) {
        info!(target: "session", "Connected to the server (login accepted)");
        self.session.mark_joined();
    }

    fn on_disconnect(&self, payload: Option<&str>) {
        let reason = extract_reason(payload);
        let lasted = self
            .session
            .joined_at()
            .map(|joined| (Utc::now() - joined).num_seconds());

        info!(target: "session", "==================================");
        match lasted {
            Some(secs) => info!(target: "session", "Connection ended after {}s in game", secs),
            None => info!(target: "session", "Connection ended"),
        }
        if !reason.is_empty() {
            info!(target: "session", "{}", reason);
        }
        info!(target: "session", "==================================");

        self.session.record_disconnect(reason);
        self.session.stop();
    }

    fn on_chat(&self, payload: Option<&str>) {
        let message = extract_reason(payload);
        if message.is_empty() {
            return;
        }
        info!(target: "chat", "[SERVER] {}", message);

        if let Some(prompt) = AuthPrompt::detect(&message) {
            match prompt {
                AuthPrompt::Register => {
                    info!(target: "chat", "Registration prompt detected, sending /register")
                }
                AuthPrompt::Login => info!(target: "chat", "Login prompt detected, sending /login"),
            }
            self.outbound.push(prompt.reply(&self.credential));
        }
    }

    fn on_position(&self, position: Position) {
        debug!(target: "session", "Position update: {}", position);
        self.session.record_position(position);
    }

    /// Stop the session once the transport has dropped its end of the
    /// event stream. Returns whether the close was unexpected, i.e. the
    /// player was in game and no disconnect packet arrived.
    ///
    /// A connect that fails before join also drops the stream; the runner
    /// reports that failure itself.
    fn on_stream_closed(&self) -> bool {
        if !self.session.stop() {
            return false;
        }
        if self.session.joined_at().is_none() {
            debug!(target: "session", "Event stream closed before joining");
            return false;
        }
        warn!(target: "session", "Event stream closed without a disconnect packet");
        true
    }

    /// Consume transport events in order until the stream ends or the cycle
    /// is torn down.
    ///
    /// On teardown, events already delivered are still handled so a late
    /// disconnect reason is recorded. If the transport goes away without
    /// sending a disconnect, the session is stopped here.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<ClientEvent>,
        mut teardown: watch::Receiver<bool>,
    ) {
        debug!(target: "session", "Event dispatcher started");

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        self.on_stream_closed();
                        break;
                    }
                },
                _ = teardown.changed() => {
                    events.close();
                    while let Some(event) = events.recv().await {
                        self.handle_event(event);
                    }
                    self.session.stop();
                    break;
                }
            }
        }

        debug!(target: "session", "Event dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> (
        EventDispatcher,
        Arc<SessionState>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let session = Arc::new(SessionState::new());
        let (queue, rx) = OutboundQueue::channel();
        let credential = Credential::new("s3cret").unwrap();
        (
            EventDispatcher::new(session.clone(), credential, queue),
            session,
            rx,
        )
    }

    fn chat(text: &str) -> ClientEvent {
        ClientEvent::ChatMessage {
            payload: Some(format!(r#"{{"text":"{}"}}"#, text)),
        }
    }

    #[test]
    fn test_detect_prompts() {
        assert_eq!(AuthPrompt::detect("Please /REGISTER"), Some(AuthPrompt::Register));
        assert_eq!(AuthPrompt::detect("Registrate con"), Some(AuthPrompt::Register));
        assert_eq!(AuthPrompt::detect("Use /login"), Some(AuthPrompt::Login));
        assert_eq!(AuthPrompt::detect("Welcome back"), None);
    }

    #[test]
    fn test_register_prompt_enqueues_register() {
        let (dispatcher, _, mut rx) = dispatcher();
        dispatcher.handle_event(chat("Please /register <password> <password>"));

        assert_eq!(rx.try_recv().unwrap(), "/register s3cret s3cret");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_register_wins_over_login() {
        let (dispatcher, _, mut rx) = dispatcher();
        dispatcher.handle_event(chat("/register or /login to play"));

        assert_eq!(rx.try_recv().unwrap(), "/register s3cret s3cret");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_login_prompt_enqueues_login() {
        let (dispatcher, _, mut rx) = dispatcher();
        dispatcher.handle_event(chat("Please /LOGIN <password>"));

        assert_eq!(rx.try_recv().unwrap(), "/login s3cret");
    }

    #[test]
    fn test_unrelated_chat_is_ignored() {
        let (dispatcher, _, mut rx) = dispatcher();
        dispatcher.handle_event(chat("Welcome to the server!"));
        dispatcher.handle_event(ClientEvent::ChatMessage { payload: None });

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_records_cause_and_stops() {
        let (dispatcher, session, _rx) = dispatcher();
        dispatcher.handle_event(ClientEvent::JoinGame);
        assert!(session.joined_at().is_some());

        dispatcher.handle_event(ClientEvent::Disconnect {
            payload: Some(r#"{"text":"Connection throttled! Please wait"}"#.to_string()),
        });

        assert!(!session.is_running());
        assert_eq!(
            session.disconnect_cause().as_deref(),
            Some("Connection throttled! Please wait")
        );
    }

    #[test]
    fn test_position_update_is_recorded() {
        let (dispatcher, session, _rx) = dispatcher();
        let position = Position::new(1.0, 2.0, 3.0, 4.0, 5.0);
        dispatcher.handle_event(ClientEvent::PositionAndLook(position));

        assert_eq!(session.current_position(), Some(position));
    }

    #[tokio::test]
    async fn test_stream_end_stops_session() {
        let (dispatcher, session, _rx) = dispatcher();
        let (tx, rx) = mpsc::channel(8);
        let (_teardown_tx, teardown_rx) = watch::channel(false);

        tx.send(ClientEvent::JoinGame).await.unwrap();
        drop(tx);
        dispatcher.run(rx, teardown_rx).await;

        assert!(!session.is_running());
        assert!(session.disconnect_cause().is_none());
    }

    #[test]
    fn test_stream_close_before_join_is_not_unexpected() {
        let (dispatcher, session, _rx) = dispatcher();

        assert!(!dispatcher.on_stream_closed());
        assert!(!session.is_running());
    }

    #[test]
    fn test_stream_close_in_game_is_unexpected_once() {
        let (dispatcher, session, _rx) = dispatcher();
        dispatcher.handle_event(ClientEvent::JoinGame);

        assert!(dispatcher.on_stream_closed());
        assert!(!session.is_running());
        assert!(!dispatcher.on_stream_closed());
    }

    #[test]
    fn test_stream_close_after_disconnect_is_expected() {
        let (dispatcher, _session, _rx) = dispatcher();
        dispatcher.handle_event(ClientEvent::JoinGame);
        dispatcher.handle_event(ClientEvent::Disconnect { payload: None });

        assert!(!dispatcher.on_stream_closed());
    }

    #[tokio::test]
    async fn test_teardown_ends_loop_while_transport_holds_sender() {
        let (dispatcher, session, _rx) = dispatcher();
        let (tx, rx) = mpsc::channel(8);
        let (teardown_tx, teardown_rx) = watch::channel(false);

        tx.send(ClientEvent::Disconnect {
            payload: Some("late".to_string()),
        })
        .await
        .unwrap();
        teardown_tx.send(true).unwrap();
        dispatcher.run(rx, teardown_rx).await;

        assert!(!session.is_running());
        assert_eq!(session.disconnect_cause().as_deref(), Some("late"));
        assert!(tx.is_closed());
    }
}
