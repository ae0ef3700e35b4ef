//! In-memory transport driven by a script, for tests and dry runs

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use afkbot_events::{ClientEvent, OutboundPacket};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::client::SessionHandle;
use crate::transport::{Connection, Connector, ServerTarget, TransportError};

/// What one scripted `connect` call does
#[derive(Debug, Clone)]
pub enum ScriptedSession {
    /// Accept, deliver `events` in order, then end the stream unless
    /// `keep_open` is set. An open session ends on `disconnect`. With
    /// `stall_disconnect`, `disconnect` never returns.
    Accept {
        events: Vec<ClientEvent>,
        keep_open: bool,
        stall_disconnect: bool,
    },
    /// Send a login-phase disconnect with this payload and fail the connect
    Reject { payload: String },
    /// Fail the connect with an I/O error before anything is exchanged
    Unreachable,
}

impl ScriptedSession {
    pub fn accept(events: Vec<ClientEvent>) -> Self {
        ScriptedSession::Accept {
            events,
            keep_open: false,
            stall_disconnect: false,
        }
    }

    pub fn accept_open(events: Vec<ClientEvent>) -> Self {
        ScriptedSession::Accept {
            events,
            keep_open: true,
            stall_disconnect: false,
        }
    }

    /// Like [`ScriptedSession::accept`], but closing the connection hangs
    /// the way a wedged socket write would
    pub fn accept_stalled(events: Vec<ClientEvent>) -> Self {
        ScriptedSession::Accept {
            events,
            keep_open: false,
            stall_disconnect: true,
        }
    }

    pub fn reject(payload: impl Into<String>) -> Self {
        ScriptedSession::Reject {
            payload: payload.into(),
        }
    }
}

/// Connection that records what was sent to it
#[derive(Debug)]
pub struct RecordingConnection {
    sent: Mutex<Vec<OutboundPacket>>,
    failing_sends: AtomicUsize,
    stall_disconnect: AtomicBool,
    disconnected: watch::Sender<bool>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        let (disconnected, _) = watch::channel(false);
        Self {
            sent: Mutex::new(Vec::new()),
            failing_sends: AtomicUsize::new(0),
            stall_disconnect: AtomicBool::new(false),
            disconnected,
        }
    }

    pub fn sent(&self) -> Vec<OutboundPacket> {
        self.sent.lock().clone()
    }

    /// Chat lines sent so far, in order
    pub fn sent_chat(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|packet| match packet {
                OutboundPacket::ChatSend { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::Release);
    }

    /// Make `disconnect` mark the connection closed and then never return
    pub fn stall_disconnect(&self) {
        self.stall_disconnect.store(true, Ordering::Release);
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.borrow()
    }

    async fn wait_disconnected(&self) {
        let mut rx = self.disconnected.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::NotConnected);
        }
        let failing = self
            .failing_sends
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }
        self.sent.lock().push(packet);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.send_replace(true);
        if self.stall_disconnect.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
    }
}

/// Connector that plays back [`ScriptedSession`]s, one per `connect` call.
///
/// Once the script runs out every further attempt is unreachable.
#[derive(Default)]
pub struct MemoryConnector {
    script: Mutex<VecDeque<ScriptedSession>>,
    targets: Mutex<Vec<ServerTarget>>,
    connections: Mutex<Vec<Arc<RecordingConnection>>>,
}

impl MemoryConnector {
    pub fn new(script: impl IntoIterator<Item = ScriptedSession>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, session: ScriptedSession) {
        self.script.lock().push_back(session);
    }

    /// Number of `connect` calls so far
    pub fn attempts(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn targets(&self) -> Vec<ServerTarget> {
        self.targets.lock().clone()
    }

    /// Connections handed out for accepted sessions, oldest first
    pub fn connections(&self) -> Vec<Arc<RecordingConnection>> {
        self.connections.lock().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        target: &ServerTarget,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<SessionHandle, TransportError> {
        self.targets.lock().push(target.clone());
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(ScriptedSession::Unreachable);

        match next {
            ScriptedSession::Unreachable => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            ScriptedSession::Reject { payload } => {
                let _ = events
                    .send(ClientEvent::Disconnect {
                        payload: Some(payload.clone()),
                    })
                    .await;
                Err(TransportError::Rejected(payload))
            }
            ScriptedSession::Accept {
                events: scripted,
                keep_open,
                stall_disconnect,
            } => {
                let connection = Arc::new(RecordingConnection::new());
                if stall_disconnect {
                    connection.stall_disconnect();
                }
                self.connections.lock().push(connection.clone());

                let reader = connection.clone();
                tokio::spawn(async move {
                    for event in scripted {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                    if keep_open {
                        reader.wait_disconnected().await;
                    }
                });

                Ok(connection)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn target() -> ServerTarget {
        ServerTarget {
            host: "localhost".to_string(),
            port: 25565,
            username: "BotAFK".to_string(),
        }
    }

    #[tokio::test]
    async fn test_script_is_played_in_order() {
        let connector = MemoryConnector::new([
            ScriptedSession::accept(vec![ClientEvent::JoinGame]),
            ScriptedSession::reject("throttled"),
        ]);

        let (tx, mut rx) = mpsc::channel(8);
        assert!(connector.connect(&target(), tx).await.is_ok());
        assert_eq!(rx.recv().await, Some(ClientEvent::JoinGame));
        assert_eq!(rx.recv().await, None);

        let (tx, mut rx) = mpsc::channel(8);
        let err = connector.connect(&target(), tx).await.err();
        assert!(matches!(err, Some(TransportError::Rejected(_))));
        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Disconnect {
                payload: Some("throttled".to_string())
            })
        );

        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            connector.connect(&target(), tx).await.err(),
            Some(TransportError::Io(_))
        ));
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_disconnect_never_completes() {
        let connector = MemoryConnector::new([ScriptedSession::accept_stalled(vec![])]);
        let (tx, _rx) = mpsc::channel(8);
        let handle = connector.connect(&target(), tx).await.unwrap();

        let closing = tokio::time::timeout(Duration::from_secs(60), handle.disconnect()).await;
        assert!(closing.is_err());
        assert!(connector.connections()[0].is_disconnected());
    }

    #[tokio::test]
    async fn test_open_session_ends_on_disconnect() {
        let connector = MemoryConnector::new([ScriptedSession::accept_open(vec![])]);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = connector.connect(&target(), tx).await.unwrap();

        handle.send(OutboundPacket::chat("hello")).await.unwrap();
        handle.disconnect().await;

        assert_eq!(rx.recv().await, None);
        let connection = &connector.connections()[0];
        assert!(connection.is_disconnected());
        assert_eq!(connection.sent_chat(), vec!["hello".to_string()]);
        assert!(handle.send(OutboundPacket::chat("late")).await.is_err());
    }
}
