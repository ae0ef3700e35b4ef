use std::sync::Arc;

use afkbot_events::Position;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::transport::Connection;

/// Ownership of one live transport connection
pub type SessionHandle = Arc<dyn Connection>;

/// Shared secret used to answer `/register` and `/login` prompts
#[derive(Clone)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Returns `None` for an empty secret.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            None
        } else {
            Some(Self(Arc::from(secret)))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// ========== Run State ==========

/// Running/stopped flag for one session cycle.
///
/// Once stopped, a cycle never resumes; the next cycle gets a new `RunState`.
#[derive(Debug)]
pub struct RunState {
    stopped: watch::Sender<bool>,
}

impl RunState {
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self { stopped }
    }

    pub fn is_running(&self) -> bool {
        !*self.stopped.borrow()
    }

    /// Returns true if this call performed the transition.
    pub fn stop(&self) -> bool {
        self.stopped.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    /// Resolves once the cycle is stopped (immediately if it already is).
    pub async fn stopped(&self) {
        let mut rx = self.stopped.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Session State ==========

/// One anti-idle step computed from the last known position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepaliveMove {
    pub position: Position,
    pub offset: f64,
}

#[derive(Default)]
struct SessionData {
    handle: Option<SessionHandle>,
    position: Option<Position>,
    movement_sign: MovementSign,
    disconnect_cause: Option<String>,
    joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MovementSign {
    #[default]
    Positive,
    Negative,
}

impl MovementSign {
    fn factor(self) -> f64 {
        match self {
            MovementSign::Positive => 1.0,
            MovementSign::Negative => -1.0,
        }
    }

    fn flipped(self) -> Self {
        match self {
            MovementSign::Positive => MovementSign::Negative,
            MovementSign::Negative => MovementSign::Positive,
        }
    }
}

/// Everything one session cycle knows about its connection.
///
/// Shared between the dispatcher and the workers of a single cycle; a new
/// cycle always starts from a fresh `SessionState`.
#[derive(Default)]
pub struct SessionState {
    data: Mutex<SessionData>,
    run: RunState,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_handle(&self, handle: SessionHandle) {
        self.data.lock().handle = Some(handle);
    }

    /// Drops the handle and returns it so the caller can tear it down.
    pub fn clear_handle(&self) -> Option<SessionHandle> {
        self.data.lock().handle.take()
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.data.lock().handle.clone()
    }

    /// Store a server-issued position and restart the movement oscillation.
    pub fn record_position(&self, position: Position) {
        let mut data = self.data.lock();
        data.position = Some(position);
        data.movement_sign = MovementSign::Positive;
    }

    pub fn current_position(&self) -> Option<Position> {
        self.data.lock().position
    }

    pub fn record_disconnect(&self, cause: String) {
        self.data.lock().disconnect_cause = Some(cause);
    }

    pub fn disconnect_cause(&self) -> Option<String> {
        self.data.lock().disconnect_cause.clone()
    }

    pub fn mark_joined(&self) {
        self.data.lock().joined_at = Some(Utc::now());
    }

    pub fn joined_at(&self) -> Option<DateTime<Utc>> {
        self.data.lock().joined_at
    }

    /// Compute the next anti-idle step and flip the sign for the one after.
    ///
    /// Returns `None` until a position has been recorded.
    pub fn next_keepalive_move(&self, step: f64) -> Option<KeepaliveMove> {
        let mut data = self.data.lock();
        let position = data.position?;
        let offset = step * data.movement_sign.factor();
        data.movement_sign = data.movement_sign.flipped();
        Some(KeepaliveMove {
            position: position.offset_x(offset),
            offset,
        })
    }

    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    pub fn stop(&self) -> bool {
        self.run.stop()
    }

    pub async fn stopped(&self) {
        self.run.stopped().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_point() -> Position {
        Position::new(10.0, 64.0, 10.0, 0.0, 0.0)
    }

    #[test]
    fn test_empty_credential_is_rejected() {
        assert!(Credential::new("").is_none());
        assert_eq!(Credential::new("hunter2").unwrap().expose(), "hunter2");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("hunter2").unwrap();
        assert!(!format!("{:?}", credential).contains("hunter2"));
    }

    #[test]
    fn test_fresh_session_is_empty_and_running() {
        let session = SessionState::new();
        assert!(session.is_running());
        assert!(session.handle().is_none());
        assert!(session.current_position().is_none());
        assert!(session.disconnect_cause().is_none());
        assert!(session.joined_at().is_none());
    }

    #[test]
    fn test_stop_is_one_way() {
        let session = SessionState::new();
        assert!(session.stop());
        assert!(!session.stop());
        assert!(!session.is_running());
    }

    #[test]
    fn test_keepalive_move_requires_position() {
        let session = SessionState::new();
        assert!(session.next_keepalive_move(0.15).is_none());
    }

    #[test]
    fn test_keepalive_move_alternates() {
        let session = SessionState::new();
        session.record_position(spawn_point());

        let first = session.next_keepalive_move(0.15).unwrap();
        let second = session.next_keepalive_move(0.15).unwrap();
        let third = session.next_keepalive_move(0.15).unwrap();

        assert!((first.position.x - 10.15).abs() < 1e-9);
        assert!((second.position.x - 9.85).abs() < 1e-9);
        assert!((third.position.x - 10.15).abs() < 1e-9);
        assert_eq!(second.position.y, 64.0);
    }

    #[test]
    fn test_position_update_resets_sign() {
        let session = SessionState::new();
        session.record_position(spawn_point());
        let first = session.next_keepalive_move(0.15).unwrap();
        assert!(first.offset > 0.0);

        session.record_position(Position::new(20.0, 70.0, 20.0, 90.0, 10.0));
        let after_reset = session.next_keepalive_move(0.15).unwrap();
        assert!(after_reset.offset > 0.0);
        assert!((after_reset.position.x - 20.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let session = Arc::new(SessionState::new());
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.stopped().await })
        };

        session.stop();
        waiter.await.unwrap();
    }
}
