//! # Frame encoding and decoding.
//!
//! ```text
//! +-----------+-------------+-----------+-------------------+------------------+
//! | magic u32 | version u16 | type u16  | payload_size u32  | payload (fixed)  |
//! +-----------+-------------+-----------+-------------------+------------------+
//!  \________________________ 12 bytes ______________________/
//! ```
//!
//! ## Rules
//! - Magic and version are a hard fence: a mismatch rejects the frame.
//! - `payload_size` must equal the fixed size of the message kind.
//! - All integers and floats are big-endian.
//! - Pure functions, no I/O.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

use super::message::{Message, MessageKind};

/// Protocol magic ("MRCD").
pub const MAGIC: u32 = 0x4D52_4344;
/// Protocol version.
pub const VERSION: u16 = 1;
/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 12;
/// Largest payload a receiver will read and discard to stay frame-aligned.
pub const MAX_PAYLOAD: u32 = 4096;

/// Decoded frame header.
///
/// `type_code` is kept raw: unknown codes are rejected by [`decode_payload`],
/// after the receiver has had a chance to skip the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub type_code: u16,
    pub payload_size: u32,
}

impl FrameHeader {
    /// Header for a known message kind.
    pub fn for_kind(kind: MessageKind) -> Self {
        Self {
            type_code: kind.to_u16(),
            payload_size: kind.payload_size() as u32,
        }
    }
}

/// Encodes a message as header + payload.
pub fn encode(msg: &Message) -> Vec<u8> {
    let kind = msg.kind();
    let mut buf = Vec::with_capacity(HEADER_LEN + kind.payload_size());
    encode_header(&FrameHeader::for_kind(kind), &mut buf);
    msg.write_payload(&mut buf);
    buf
}

fn encode_header(header: &FrameHeader, buf: &mut impl BufMut) {
    buf.put_u32(MAGIC);
    buf.put_u16(VERSION);
    buf.put_u16(header.type_code);
    buf.put_u32(header.payload_size);
}

/// Decodes the 12-byte header.
///
/// Checks magic and version; anything beyond that is left to [`decode_payload`].
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: bytes.len(),
        });
    }

    let mut buf = &bytes[..HEADER_LEN];
    let magic = buf.get_u32();
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic { found: magic });
    }
    let version = buf.get_u16();
    if version != VERSION {
        return Err(ProtocolError::BadVersion { found: version });
    }

    let type_code = buf.get_u16();
    let payload_size = buf.get_u32();
    if payload_size > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            declared: payload_size,
        });
    }
    Ok(FrameHeader {
        type_code,
        payload_size,
    })
}

/// Decodes a payload for an already validated header.
pub fn decode_payload(header: &FrameHeader, bytes: &[u8]) -> Result<Message, ProtocolError> {
    let kind = MessageKind::from_u16(header.type_code).ok_or(ProtocolError::UnknownType {
        code: header.type_code,
    })?;

    let expected = kind.payload_size();
    if header.payload_size as usize != expected {
        return Err(ProtocolError::PayloadSizeMismatch {
            code: header.type_code,
            declared: header.payload_size,
            expected,
        });
    }
    if bytes.len() < expected {
        return Err(ProtocolError::Truncated {
            needed: expected,
            available: bytes.len(),
        });
    }

    let mut buf = &bytes[..expected];
    Ok(Message::read_payload(kind, &mut buf))
}

/// Decodes one complete frame from the start of `bytes`.
pub fn decode_frame(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let header = decode_header(bytes)?;
    decode_payload(&header, &bytes[HEADER_LEN..])
}
