//! Transport seam between the session core and the wire protocol
//!
//! The session core only sees [`Connector`] and [`Connection`]. Inbound
//! packets reach it as [`ClientEvent`]s on the channel handed to
//! [`Connector::connect`]; the transport drops its sender when the
//! connection is gone.

pub mod codec;
pub mod memory;
pub mod packets;
pub mod tcp;

use std::time::Duration;

use afkbot_events::{ClientEvent, OutboundPacket};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::SessionHandle;

pub use tcp::TcpConnector;

/// Buffer between a transport's reader and the event dispatcher
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl ServerTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("server refused the login: {0}")]
    Rejected(String),

    #[error("server requires online-mode authentication, which is not supported")]
    OnlineModeUnsupported,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,

    #[error("chat message is {len} characters, the limit is {max}")]
    MessageTooLong { len: usize, max: usize },
}

/// Opens sessions against a server
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect and finish the login phase.
    ///
    /// Events start flowing on `events` as soon as the server sends them,
    /// possibly before this returns. The caller must already be consuming
    /// the channel.
    async fn connect(
        &self,
        target: &ServerTarget,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<SessionHandle, TransportError>;
}

/// One established session
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError>;

    /// Close the session. Best-effort and idempotent.
    async fn disconnect(&self);
}
