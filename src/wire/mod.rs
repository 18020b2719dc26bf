//! Binary wire protocol between controller and worker.
//!
//! ## Contents
//! - [`MessageKind`], [`Message`] and the fixed-layout payload structs
//! - [`encode`], [`decode_header`], [`decode_payload`], [`decode_frame`]
//!
//! The codec is pure; sockets live in [`crate::transport`].

mod codec;
mod message;

pub use codec::{
    FrameHeader, HEADER_LEN, MAGIC, MAX_PAYLOAD, VERSION, decode_frame, decode_header,
    decode_payload, encode,
};
pub use message::{AlgoResult, Message, MessageKind, Payload, Ping, Pong, SensorFrame, StatusFrame};
