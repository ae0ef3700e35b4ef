//! Length-prefixed packet framing, with optional zlib compression
//!
//! Uncompressed frame: `VarInt length | VarInt packet id | body`.
//! Once the server sends Set Compression, every frame becomes
//! `VarInt length | VarInt uncompressed length | payload`, where an
//! uncompressed length of 0 means the payload was sent as-is.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tokio_util::codec::{Decoder, Encoder};

use crate::transport::TransportError;

/// Largest frame a 3-byte VarInt length can describe
pub const MAX_PACKET_SIZE: usize = 2_097_151;

/// Largest uncompressed payload we agree to inflate
pub const MAX_UNCOMPRESSED_SIZE: usize = 8_388_608;

/// A packet before interpretation: id plus undecoded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub body: Bytes,
}

impl RawPacket {
    pub fn new(id: i32, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }
}

pub fn put_varint(dst: &mut BytesMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            dst.put_u8(value as u8);
            return;
        }
        dst.put_u8(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
}

/// Read a VarInt from a buffer that must already hold all of it.
pub fn get_varint(src: &mut impl Buf) -> Result<i32, TransportError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        if !src.has_remaining() {
            return Err(TransportError::Protocol("truncated VarInt".into()));
        }
        let byte = src.get_u8();
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(TransportError::Protocol("VarInt longer than 5 bytes".into()))
}

/// Look at a VarInt at the start of `src` without consuming it.
///
/// Returns the value and its encoded width, or `None` if more bytes are needed.
fn peek_varint(src: &[u8]) -> Result<Option<(i32, usize)>, TransportError> {
    let mut value: u32 = 0;
    for (i, byte) in src.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if src.len() >= 5 {
        Err(TransportError::Protocol("VarInt longer than 5 bytes".into()))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct PacketCodec {
    compression_threshold: Option<usize>,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a Set Compression threshold; negative disables compression.
    pub fn set_compression(&mut self, threshold: i32) {
        self.compression_threshold = usize::try_from(threshold).ok();
    }

    pub fn compression_threshold(&self) -> Option<usize> {
        self.compression_threshold
    }

    fn inflate(&self, mut frame: Bytes) -> Result<Bytes, TransportError> {
        let uncompressed_len = get_varint(&mut frame)?;
        if uncompressed_len == 0 {
            return Ok(frame);
        }

        let uncompressed_len = usize::try_from(uncompressed_len)
            .ok()
            .filter(|len| *len <= MAX_UNCOMPRESSED_SIZE)
            .ok_or_else(|| {
                TransportError::Protocol(format!(
                    "bad uncompressed length {}",
                    uncompressed_len
                ))
            })?;

        let mut inflated = Vec::with_capacity(uncompressed_len);
        ZlibDecoder::new(&frame[..])
            .take(uncompressed_len as u64 + 1)
            .read_to_end(&mut inflated)?;
        if inflated.len() != uncompressed_len {
            return Err(TransportError::Protocol(format!(
                "expected {} bytes after inflating, got {}",
                uncompressed_len,
                inflated.len()
            )));
        }
        Ok(Bytes::from(inflated))
    }
}

impl Decoder for PacketCodec {
    type Item = RawPacket;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((length, width)) = peek_varint(src)? else {
            return Ok(None);
        };

        let length = usize::try_from(length)
            .ok()
            .filter(|len| *len <= MAX_PACKET_SIZE)
            .ok_or_else(|| TransportError::Protocol(format!("bad frame length {}", length)))?;

        if src.len() < width + length {
            src.reserve(width + length - src.len());
            return Ok(None);
        }

        src.advance(width);
        let frame = src.split_to(length).freeze();
        let mut payload = match self.compression_threshold {
            Some(_) => self.inflate(frame)?,
            None => frame,
        };

        let id = get_varint(&mut payload)?;
        Ok(Some(RawPacket { id, body: payload }))
    }
}

impl Encoder<RawPacket> for PacketCodec {
    type Error = TransportError;

    fn encode(&mut self, item: RawPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut data = BytesMut::with_capacity(item.body.len() + 5);
        put_varint(&mut data, item.id);
        data.extend_from_slice(&item.body);

        let frame = match self.compression_threshold {
            None => data,
            Some(threshold) => {
                let mut frame = BytesMut::new();
                if data.len() >= threshold {
                    put_varint(&mut frame, data.len() as i32);
                    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                    encoder.write_all(&data)?;
                    frame.extend_from_slice(&encoder.finish()?);
                } else {
                    put_varint(&mut frame, 0);
                    frame.extend_from_slice(&data);
                }
                frame
            }
        };

        if frame.len() > MAX_PACKET_SIZE {
            return Err(TransportError::Protocol(format!(
                "packet 0x{:02X} too large ({} bytes)",
                item.id,
                frame.len()
            )));
        }

        put_varint(dst, frame.len() as i32);
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
