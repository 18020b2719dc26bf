//! # Message kinds carried inside frames.
//!
//! Every kind has a fixed payload layout (big-endian, no padding):
//!
//! ```text
//! Ping:        seq:u64  t0:u64
//! Pong:        seq:u64  t0:u64  t1:u64
//! SensorFrame: seq:u64  ts:u64  a:f64  b:f64  c:f64
//! AlgoResult:  sensor_seq:u64  produced_ts:u64  out_value:f64  latency_ms:f64
//! StatusFrame: ts:u64  status_code:u32
//! ```
//!
//! Timestamps are nanoseconds since a process-local monotonic epoch
//! (see [`crate::clock`]); they are only meaningful as differences.

use bytes::{Buf, BufMut};

/// Wire type code of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    Pong,
    SensorFrame,
    AlgoResult,
    /// Reserved; decodable but ignored by both endpoints.
    StatusFrame,
}

impl MessageKind {
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Ping => 1,
            Self::Pong => 2,
            Self::SensorFrame => 3,
            Self::AlgoResult => 4,
            Self::StatusFrame => 5,
        }
    }

    pub const fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Ping),
            2 => Some(Self::Pong),
            3 => Some(Self::SensorFrame),
            4 => Some(Self::AlgoResult),
            5 => Some(Self::StatusFrame),
            _ => None,
        }
    }

    /// Fixed payload size in bytes for this kind.
    pub const fn payload_size(self) -> usize {
        match self {
            Self::Ping => Ping::SIZE,
            Self::Pong => Pong::SIZE,
            Self::SensorFrame => SensorFrame::SIZE,
            Self::AlgoResult => AlgoResult::SIZE,
            Self::StatusFrame => StatusFrame::SIZE,
        }
    }
}

/// Fixed-layout payload of one message kind.
///
/// `read_from` assumes the caller already checked that at least
/// [`Payload::SIZE`] bytes remain.
pub trait Payload: Sized {
    const KIND: MessageKind;
    const SIZE: usize;

    fn write_to(&self, buf: &mut impl BufMut);
    fn read_from(buf: &mut impl Buf) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping {
    pub seq: u64,
    pub t0_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pong {
    /// Echo of [`Ping::seq`].
    pub seq: u64,
    /// Echo of [`Ping::t0_ns`].
    pub t0_ns: u64,
    /// Worker clock when the reply was produced.
    pub t1_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorFrame {
    pub seq: u64,
    pub ts_ns: u64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlgoResult {
    /// Sequence of the sensor frame this result was computed from.
    pub sensor_seq: u64,
    pub produced_ts_ns: u64,
    pub out_value: f64,
    /// Compute time measured by the worker.
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFrame {
    pub ts_ns: u64,
    pub status_code: u32,
}

impl Payload for Ping {
    const KIND: MessageKind = MessageKind::Ping;
    const SIZE: usize = 16;

    fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.seq);
        buf.put_u64(self.t0_ns);
    }

    fn read_from(buf: &mut impl Buf) -> Self {
        Self {
            seq: buf.get_u64(),
            t0_ns: buf.get_u64(),
        }
    }
}

impl Payload for Pong {
    const KIND: MessageKind = MessageKind::Pong;
    const SIZE: usize = 24;

    fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.seq);
        buf.put_u64(self.t0_ns);
        buf.put_u64(self.t1_ns);
    }

    fn read_from(buf: &mut impl Buf) -> Self {
        Self {
            seq: buf.get_u64(),
            t0_ns: buf.get_u64(),
            t1_ns: buf.get_u64(),
        }
    }
}

impl Payload for SensorFrame {
    const KIND: MessageKind = MessageKind::SensorFrame;
    const SIZE: usize = 40;

    fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.seq);
        buf.put_u64(self.ts_ns);
        buf.put_f64(self.a);
        buf.put_f64(self.b);
        buf.put_f64(self.c);
    }

    fn read_from(buf: &mut impl Buf) -> Self {
        Self {
            seq: buf.get_u64(),
            ts_ns: buf.get_u64(),
            a: buf.get_f64(),
            b: buf.get_f64(),
            c: buf.get_f64(),
        }
    }
}

impl Payload for AlgoResult {
    const KIND: MessageKind = MessageKind::AlgoResult;
    const SIZE: usize = 32;

    fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.sensor_seq);
        buf.put_u64(self.produced_ts_ns);
        buf.put_f64(self.out_value);
        buf.put_f64(self.latency_ms);
    }

    fn read_from(buf: &mut impl Buf) -> Self {
        Self {
            sensor_seq: buf.get_u64(),
            produced_ts_ns: buf.get_u64(),
            out_value: buf.get_f64(),
            latency_ms: buf.get_f64(),
        }
    }
}

impl Payload for StatusFrame {
    const KIND: MessageKind = MessageKind::StatusFrame;
    const SIZE: usize = 12;

    fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.ts_ns);
        buf.put_u32(self.status_code);
    }

    fn read_from(buf: &mut impl Buf) -> Self {
        Self {
            ts_ns: buf.get_u64(),
            status_code: buf.get_u32(),
        }
    }
}

/// Any decoded message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Ping(Ping),
    Pong(Pong),
    SensorFrame(SensorFrame),
    AlgoResult(AlgoResult),
    StatusFrame(StatusFrame),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::SensorFrame(_) => MessageKind::SensorFrame,
            Message::AlgoResult(_) => MessageKind::AlgoResult,
            Message::StatusFrame(_) => MessageKind::StatusFrame,
        }
    }

    pub(crate) fn write_payload(&self, buf: &mut impl BufMut) {
        match self {
            Message::Ping(m) => m.write_to(buf),
            Message::Pong(m) => m.write_to(buf),
            Message::SensorFrame(m) => m.write_to(buf),
            Message::AlgoResult(m) => m.write_to(buf),
            Message::StatusFrame(m) => m.write_to(buf),
        }
    }

    pub(crate) fn read_payload(kind: MessageKind, buf: &mut impl Buf) -> Self {
        match kind {
            MessageKind::Ping => Message::Ping(Ping::read_from(buf)),
            MessageKind::Pong => Message::Pong(Pong::read_from(buf)),
            MessageKind::SensorFrame => Message::SensorFrame(SensorFrame::read_from(buf)),
            MessageKind::AlgoResult => Message::AlgoResult(AlgoResult::read_from(buf)),
            MessageKind::StatusFrame => Message::StatusFrame(StatusFrame::read_from(buf)),
        }
    }
}

macro_rules! impl_from_payload {
    ($($ty:ident),*) => {
        $(impl From<$ty> for Message {
            fn from(m: $ty) -> Self {
                Message::$ty(m)
            }
        })*
    };
}

impl_from_payload!(Ping, Pong, SensorFrame, AlgoResult, StatusFrame);
