use crate::Position;

/// Inbound events produced by a transport, in the order the server sent them
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The server accepted the player into the world
    JoinGame,
    /// The server ended the session. The payload is the raw chat component
    /// JSON, if the server sent one
    Disconnect { payload: Option<String> },
    /// A chat line from the server, as raw chat component JSON
    ChatMessage { payload: Option<String> },
    /// The server (re)positioned the player
    PositionAndLook(Position),
}

impl ClientEvent {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::JoinGame => "JoinGame",
            ClientEvent::Disconnect { .. } => "Disconnect",
            ClientEvent::ChatMessage { .. } => "ChatMessage",
            ClientEvent::PositionAndLook(_) => "PositionAndLook",
        }
    }
}
