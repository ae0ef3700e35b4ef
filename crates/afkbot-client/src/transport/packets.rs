//! Packet ids and layouts for protocol 340 (Minecraft 1.12.2)
//!
//! Only the packets the bot needs are decoded; everything else surfaces as
//! `Other(id)` and is ignored.

use afkbot_events::Position;
use bytes::{BufMut, BytesMut};
use byteorder::{BigEndian, ReadBytesExt};

use crate::transport::TransportError;
use crate::transport::codec::{RawPacket, get_varint, put_varint};

pub const PROTOCOL_VERSION: i32 = 340;

/// Longest chat line a 1.12.2 server accepts
pub const MAX_CHAT_LENGTH: usize = 256;

/// Longest chat component JSON we read
const MAX_JSON_LENGTH: usize = 262_144;

pub mod clientbound {
    pub mod login {
        pub const DISCONNECT: i32 = 0x00;
        pub const ENCRYPTION_REQUEST: i32 = 0x01;
        pub const LOGIN_SUCCESS: i32 = 0x02;
        pub const SET_COMPRESSION: i32 = 0x03;
    }

    pub mod play {
        pub const CHAT_MESSAGE: i32 = 0x0F;
        pub const DISCONNECT: i32 = 0x1A;
        pub const KEEP_ALIVE: i32 = 0x1F;
        pub const JOIN_GAME: i32 = 0x23;
        pub const PLAYER_POSITION_AND_LOOK: i32 = 0x2F;
    }
}

pub mod serverbound {
    pub const HANDSHAKE: i32 = 0x00;

    pub mod login {
        pub const LOGIN_START: i32 = 0x00;
    }

    pub mod play {
        pub const TELEPORT_CONFIRM: i32 = 0x00;
        pub const CHAT_MESSAGE: i32 = 0x02;
        pub const KEEP_ALIVE: i32 = 0x0B;
        pub const PLAYER_POSITION_AND_LOOK: i32 = 0x0E;
    }
}

/// Handshake next-state value for logging in
const NEXT_STATE_LOGIN: i32 = 2;

// ========== Decoding ==========

#[derive(Debug, Clone, PartialEq)]
pub enum LoginPacket {
    Disconnect { reason: String },
    EncryptionRequest,
    LoginSuccess { uuid: String, username: String },
    SetCompression { threshold: i32 },
    Other(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayPacket {
    JoinGame,
    Disconnect { reason: String },
    ChatMessage { json: String, position: i8 },
    KeepAlive { id: i64 },
    PlayerPositionAndLook(ServerPosition),
    Other(i32),
}

/// Position packet as sent; fields flagged relative are deltas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub flags: u8,
    pub teleport_id: i32,
}

const RELATIVE_X: u8 = 0x01;
const RELATIVE_Y: u8 = 0x02;
const RELATIVE_Z: u8 = 0x04;
const RELATIVE_YAW: u8 = 0x08;
const RELATIVE_PITCH: u8 = 0x10;

impl ServerPosition {
    /// Turn relative fields into absolute ones using the previous position.
    /// Without a previous position the raw values are taken as absolute.
    pub fn resolve(&self, previous: Option<Position>) -> Position {
        let Some(prev) = previous else {
            return Position::new(self.x, self.y, self.z, self.yaw, self.pitch);
        };
        let rel = |bit: u8| self.flags & bit != 0;
        Position::new(
            if rel(RELATIVE_X) { prev.x + self.x } else { self.x },
            if rel(RELATIVE_Y) { prev.y + self.y } else { self.y },
            if rel(RELATIVE_Z) { prev.z + self.z } else { self.z },
            if rel(RELATIVE_YAW) { prev.yaw + self.yaw } else { self.yaw },
            if rel(RELATIVE_PITCH) { prev.pitch + self.pitch } else { self.pitch },
        )
    }
}

fn read_string(cursor: &mut &[u8], max_len: usize) -> Result<String, TransportError> {
    let len = get_varint(cursor)?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= max_len * 4)
        .ok_or_else(|| TransportError::Protocol(format!("bad string length {}", len)))?;
    if cursor.len() < len {
        return Err(TransportError::Protocol("truncated string".into()));
    }
    let (bytes, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| TransportError::Protocol(format!("invalid UTF-8 in string: {}", e)))
}

pub fn decode_login(packet: &RawPacket) -> Result<LoginPacket, TransportError> {
    use clientbound::login::*;

    let mut cursor = &packet.body[..];
    Ok(match packet.id {
        DISCONNECT => LoginPacket::Disconnect {
            reason: read_string(&mut cursor, MAX_JSON_LENGTH)?,
        },
        ENCRYPTION_REQUEST => LoginPacket::EncryptionRequest,
        LOGIN_SUCCESS => LoginPacket::LoginSuccess {
            uuid: read_string(&mut cursor, 36)?,
            username: read_string(&mut cursor, 16)?,
        },
        SET_COMPRESSION => LoginPacket::SetCompression {
            threshold: get_varint(&mut cursor)?,
        },
        other => LoginPacket::Other(other),
    })
}

pub fn decode_play(packet: &RawPacket) -> Result<PlayPacket, TransportError> {
    use clientbound::play::*;

    let mut cursor = &packet.body[..];
    Ok(match packet.id {
        JOIN_GAME => PlayPacket::JoinGame,
        DISCONNECT => PlayPacket::Disconnect {
            reason: read_string(&mut cursor, MAX_JSON_LENGTH)?,
        },
        CHAT_MESSAGE => PlayPacket::ChatMessage {
            json: read_string(&mut cursor, MAX_JSON_LENGTH)?,
            position: cursor.read_i8()?,
        },
        KEEP_ALIVE => PlayPacket::KeepAlive {
            id: cursor.read_i64::<BigEndian>()?,
        },
        PLAYER_POSITION_AND_LOOK => PlayPacket::PlayerPositionAndLook(ServerPosition {
            x: cursor.read_f64::<BigEndian>()?,
            y: cursor.read_f64::<BigEndian>()?,
            z: cursor.read_f64::<BigEndian>()?,
            yaw: cursor.read_f32::<BigEndian>()?,
            pitch: cursor.read_f32::<BigEndian>()?,
            flags: cursor.read_u8()?,
            teleport_id: get_varint(&mut cursor)?,
        }),
        other => PlayPacket::Other(other),
    })
}

// ========== Encoding ==========

fn put_string(dst: &mut BytesMut, value: &str) {
    put_varint(dst, value.len() as i32);
    dst.extend_from_slice(value.as_bytes());
}

pub fn handshake(host: &str, port: u16) -> RawPacket {
    let mut body = BytesMut::new();
    put_varint(&mut body, PROTOCOL_VERSION);
    put_string(&mut body, host);
    body.put_u16(port);
    put_varint(&mut body, NEXT_STATE_LOGIN);
    RawPacket::new(serverbound::HANDSHAKE, body.freeze())
}

pub fn login_start(username: &str) -> RawPacket {
    let mut body = BytesMut::new();
    put_string(&mut body, username);
    RawPacket::new(serverbound::login::LOGIN_START, body.freeze())
}

pub fn teleport_confirm(teleport_id: i32) -> RawPacket {
    let mut body = BytesMut::new();
    put_varint(&mut body, teleport_id);
    RawPacket::new(serverbound::play::TELEPORT_CONFIRM, body.freeze())
}

pub fn keep_alive(id: i64) -> RawPacket {
    let mut body = BytesMut::with_capacity(8);
    body.put_i64(id);
    RawPacket::new(serverbound::play::KEEP_ALIVE, body.freeze())
}

pub fn chat_message(message: &str) -> Result<RawPacket, TransportError> {
    let len = message.chars().count();
    if len > MAX_CHAT_LENGTH {
        return Err(TransportError::MessageTooLong {
            len,
            max: MAX_CHAT_LENGTH,
        });
    }
    let mut body = BytesMut::new();
    put_string(&mut body, message);
    Ok(RawPacket::new(serverbound::play::CHAT_MESSAGE, body.freeze()))
}

pub fn player_position_and_look(position: &Position, on_ground: bool) -> RawPacket {
    let mut body = BytesMut::with_capacity(33);
    body.put_f64(position.x);
    body.put_f64(position.y);
    body.put_f64(position.z);
    body.put_f32(position.yaw);
    body.put_f32(position.pitch);
    body.put_u8(on_ground as u8);
    RawPacket::new(serverbound::play::PLAYER_POSITION_AND_LOOK, body.freeze())
}
