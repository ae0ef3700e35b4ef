use crate::Position;

/// Packets the bot asks a transport to send
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPacket {
    /// A chat line or chat command (e.g. `/login <secret>`)
    ChatSend { message: String },
    /// A movement update
    PositionSend { position: Position, on_ground: bool },
}

impl OutboundPacket {
    pub fn chat(message: impl Into<String>) -> Self {
        OutboundPacket::ChatSend {
            message: message.into(),
        }
    }

    pub fn position(position: Position, on_ground: bool) -> Self {
        OutboundPacket::PositionSend {
            position,
            on_ground,
        }
    }
}
