//! Offline-mode TCP transport for Minecraft 1.12.2 servers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use afkbot_events::{ClientEvent, OutboundPacket, Position};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::client::SessionHandle;
use crate::transport::codec::{PacketCodec, RawPacket};
use crate::transport::packets::{self, LoginPacket, PlayPacket};
use crate::transport::{Connection, Connector, ServerTarget, TransportError};

type PacketStream = Framed<TcpStream, PacketCodec>;
type SharedSink = Arc<Mutex<SplitSink<PacketStream, RawPacket>>>;

/// Connects over TCP and performs the offline-mode login
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        target: &ServerTarget,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<SessionHandle, TransportError> {
        let framed = tokio::time::timeout(self.connect_timeout, login(target, &events))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        let (sink, stream) = framed.split();
        let sink = Arc::new(Mutex::new(sink));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(read_loop(stream, sink.clone(), events, shutdown_rx));

        Ok(Arc::new(TcpConnection {
            sink,
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Handshake and login. Returns the framed stream in the play state.
async fn login(
    target: &ServerTarget,
    events: &mpsc::Sender<ClientEvent>,
) -> Result<PacketStream, TransportError> {
    let address = target.address();
    debug!(target: "net", "Opening TCP connection to {}", address);

    let stream = TcpStream::connect(&address).await?;
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, PacketCodec::new());

    framed
        .send(packets::handshake(&target.host, target.port))
        .await?;
    framed.send(packets::login_start(&target.username)).await?;

    loop {
        let Some(raw) = framed.next().await.transpose()? else {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection during login",
            )));
        };

        match packets::decode_login(&raw)? {
            LoginPacket::SetCompression { threshold } => {
                debug!(target: "net", "Compression threshold set to {}", threshold);
                framed.codec_mut().set_compression(threshold);
            }
            LoginPacket::LoginSuccess { uuid, username } => {
                info!(target: "net", "Logged in as {} ({})", username, uuid);
                return Ok(framed);
            }
            LoginPacket::EncryptionRequest => return Err(TransportError::OnlineModeUnsupported),
            LoginPacket::Disconnect { reason } => {
                // Surface the reason to the dispatcher so backoff can see it
                let _ = events
                    .send(ClientEvent::Disconnect {
                        payload: Some(reason.clone()),
                    })
                    .await;
                return Err(TransportError::Rejected(reason));
            }
            LoginPacket::Other(id) => {
                debug!(target: "net", "Ignoring login packet 0x{:02X}", id);
            }
        }
    }
}

async fn send_raw(sink: &SharedSink, packet: RawPacket) -> Result<(), TransportError> {
    sink.lock().await.send(packet).await
}

/// Turn play-state packets into events until the connection ends.
///
/// Keep-alives and teleport confirmations are answered here without
/// involving the session. Dropping `events` on exit tells the dispatcher
/// the stream is over.
async fn read_loop(
    mut stream: SplitStream<PacketStream>,
    sink: SharedSink,
    events: mpsc::Sender<ClientEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut position: Option<Position> = None;

    loop {
        let raw = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = stream.next() => match next {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    warn!(target: "net", "Connection error: {}", e);
                    break;
                }
                None => {
                    debug!(target: "net", "Server closed the connection");
                    break;
                }
            }
        };

        let packet = match packets::decode_play(&raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(target: "net", "Skipping malformed packet 0x{:02X}: {}", raw.id, e);
                continue;
            }
        };

        let event = match packet {
            PlayPacket::KeepAlive { id } => {
                if let Err(e) = send_raw(&sink, packets::keep_alive(id)).await {
                    warn!(target: "net", "Failed to answer keep-alive: {}", e);
                    break;
                }
                continue;
            }
            PlayPacket::PlayerPositionAndLook(server) => {
                let resolved = server.resolve(position);
                position = Some(resolved);

                let confirmed = async {
                    send_raw(&sink, packets::teleport_confirm(server.teleport_id)).await?;
                    send_raw(&sink, packets::player_position_and_look(&resolved, true)).await
                };
                if let Err(e) = confirmed.await {
                    warn!(target: "net", "Failed to confirm teleport: {}", e);
                    break;
                }
                ClientEvent::PositionAndLook(resolved)
            }
            PlayPacket::JoinGame => ClientEvent::JoinGame,
            PlayPacket::Disconnect { reason } => ClientEvent::Disconnect {
                payload: Some(reason),
            },
            PlayPacket::ChatMessage { json, .. } => ClientEvent::ChatMessage {
                payload: Some(json),
            },
            PlayPacket::Other(_) => continue,
        };

        let last = matches!(event, ClientEvent::Disconnect { .. });
        if events.send(event).await.is_err() || last {
            break;
        }
    }

    debug!(target: "net", "Reader stopped");
}

struct TcpConnection {
    sink: SharedSink,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&self, packet: OutboundPacket) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }

        let raw = match packet {
            OutboundPacket::ChatSend { message } => packets::chat_message(&message)?,
            OutboundPacket::PositionSend {
                position,
                on_ground,
            } => packets::player_position_and_look(&position, on_ground),
        };
        send_raw(&self.sink, raw).await
    }

    async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(target: "net", "Error closing connection: {}", e);
        }
    }
}
