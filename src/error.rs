//! Error types used by the algovisor runtime.
//!
//! This module defines two error enums:
//!
//! - [`ProtocolError`] raised by the frame codec when bytes on the wire do not
//!   form a valid frame.
//! - [`LifecycleError`] raised by the process lifecycle manager while starting,
//!   handshaking with or restarting the worker.
//!
//! Transport I/O failures are deliberately absent: endpoints absorb them into
//! `bool`/`Option` results and flip their connection state instead.
//!
//! Both types provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced while decoding frames.
///
/// A protocol error drops the offending frame. It only tears down the
/// connection when the stream can no longer be resynchronised.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header magic does not match the compiled constant.
    #[error("bad magic 0x{found:08x}")]
    BadMagic {
        /// Magic value read from the wire.
        found: u32,
    },

    /// Header version does not match the compiled constant.
    #[error("unsupported protocol version {found}")]
    BadVersion {
        /// Version read from the wire.
        found: u16,
    },

    /// Type code is not one of the known message kinds.
    #[error("unknown message type {code}")]
    UnknownType {
        /// Raw type code.
        code: u16,
    },

    /// Declared payload size differs from the fixed size of the message kind.
    #[error("payload size {declared} does not match expected {expected} for type {code}")]
    PayloadSizeMismatch {
        /// Raw type code.
        code: u16,
        /// Size announced by the header.
        declared: u32,
        /// Fixed size of the kind.
        expected: usize,
    },

    /// Fewer bytes available than the header or payload requires.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// Declared payload exceeds what a receiver is willing to skip.
    #[error("payload of {declared} bytes exceeds limit")]
    PayloadTooLarge {
        /// Size announced by the header.
        declared: u32,
    },
}

impl ProtocolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use algovisor::ProtocolError;
    ///
    /// let err = ProtocolError::BadVersion { found: 7 };
    /// assert_eq!(err.as_label(), "protocol_bad_version");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::BadMagic { .. } => "protocol_bad_magic",
            ProtocolError::BadVersion { .. } => "protocol_bad_version",
            ProtocolError::UnknownType { .. } => "protocol_unknown_type",
            ProtocolError::PayloadSizeMismatch { .. } => "protocol_payload_size_mismatch",
            ProtocolError::Truncated { .. } => "protocol_truncated",
            ProtocolError::PayloadTooLarge { .. } => "protocol_payload_too_large",
        }
    }

    /// True if the byte stream can no longer be trusted to be frame-aligned.
    ///
    /// After a bad magic or version the length field is garbage, so the
    /// receiver cannot know how many bytes to skip.
    pub fn breaks_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::BadMagic { .. }
                | ProtocolError::BadVersion { .. }
                | ProtocolError::PayloadTooLarge { .. }
        )
    }
}

/// # Errors produced by the process lifecycle manager.
///
/// Everything except [`LifecycleError::RestartLimitExceeded`] is recoverable:
/// the caller decides whether to try again.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// The worker executable could not be spawned.
    #[error("failed to launch worker '{program}': {source}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The readiness signal did not arrive within the handshake timeout.
    #[error("worker not ready after {timeout:?}")]
    HandshakeTimeout {
        /// Configured readiness timeout.
        timeout: Duration,
    },

    /// The readiness pipe carried an unexpected sentinel byte.
    #[error("unexpected readiness byte 0x{found:02x}")]
    HandshakeMismatch {
        /// Byte received instead of the sentinel.
        found: u8,
    },

    /// The worker closed its readiness channel (usually: it exited) before signalling.
    #[error("worker exited before signalling readiness")]
    HandshakeClosed,

    /// The worker signalled readiness but refused the connection.
    #[error("could not connect to worker at {addr} within {timeout:?}")]
    ConnectTimeout {
        /// Worker address.
        addr: std::net::SocketAddr,
        /// Connect timeout used.
        timeout: Duration,
    },

    /// The restart budget is spent; no further restarts will be attempted.
    #[error("restart limit of {max} reached")]
    RestartLimitExceeded {
        /// Configured maximum restart count.
        max: u64,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use algovisor::LifecycleError;
    ///
    /// let err = LifecycleError::RestartLimitExceeded { max: 10 };
    /// assert_eq!(err.as_label(), "lifecycle_restart_limit_exceeded");
    /// assert!(err.is_terminal());
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::Launch { .. } => "lifecycle_launch_failed",
            LifecycleError::HandshakeTimeout { .. } => "lifecycle_handshake_timeout",
            LifecycleError::HandshakeMismatch { .. } => "lifecycle_handshake_mismatch",
            LifecycleError::HandshakeClosed => "lifecycle_handshake_closed",
            LifecycleError::ConnectTimeout { .. } => "lifecycle_connect_timeout",
            LifecycleError::RestartLimitExceeded { .. } => "lifecycle_restart_limit_exceeded",
        }
    }

    /// True if no further restart should be attempted for this worker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleError::RestartLimitExceeded { .. })
    }
}
