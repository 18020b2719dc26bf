//! # Readiness handshake.
//!
//! A freshly spawned worker tells its supervisor that its listening socket
//! is bound, through one of two mechanisms:
//!
//! ```text
//! PipeByte:    worker ──write(READY_BYTE)──► stdout pipe ──► manager reads 1 byte
//! NamedEvent:  worker ──create <tmp>/<name>.ready──────────► manager polls for it
//! ```
//!
//! The manager tells the child which mechanism to use through the
//! [`READY_ENV`] variable (`pipe` or `event:<path>`).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::time::Instant;

use crate::error::LifecycleError;

/// Sentinel written by the worker on its stdout.
pub const READY_BYTE: u8 = b'R';

/// Environment variable carrying the mechanism to the child.
pub const READY_ENV: &str = "ALGOVISOR_READY";

const MARKER_POLL: Duration = Duration::from_millis(10);

/// Mechanism the worker uses to signal readiness.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadinessSignal {
    /// One sentinel byte on the child's stdout.
    #[default]
    PipeByte,
    /// A marker file named after `name` in the temp directory.
    NamedEvent { name: String },
}

impl ReadinessSignal {
    /// Marker file for [`ReadinessSignal::NamedEvent`].
    pub fn marker_path(&self) -> Option<PathBuf> {
        match self {
            ReadinessSignal::PipeByte => None,
            ReadinessSignal::NamedEvent { name } => {
                Some(std::env::temp_dir().join(format!("{name}.ready")))
            }
        }
    }

    /// Value exported to the child in [`READY_ENV`].
    pub fn env_value(&self) -> String {
        match self.marker_path() {
            None => "pipe".to_string(),
            Some(path) => format!("event:{}", path.display()),
        }
    }
}

/// Worker-side half of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyNotifier {
    Pipe,
    Event(PathBuf),
}

impl ReadyNotifier {
    /// Parses a [`READY_ENV`] value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pipe" => Some(ReadyNotifier::Pipe),
            v => v
                .strip_prefix("event:")
                .filter(|p| !p.is_empty())
                .map(|p| ReadyNotifier::Event(PathBuf::from(p))),
        }
    }

    /// Notifier requested by the supervising process, if any.
    pub fn from_env() -> Option<Self> {
        std::env::var(READY_ENV).ok().as_deref().and_then(Self::parse)
    }

    /// Signals readiness once.
    pub fn signal(&self) -> io::Result<()> {
        match self {
            ReadyNotifier::Pipe => {
                let mut out = io::stdout().lock();
                out.write_all(&[READY_BYTE])?;
                out.flush()
            }
            ReadyNotifier::Event(path) => {
                // Write then rename so the poller never sees a half-created marker.
                let tmp = path.with_extension("tmp");
                std::fs::write(&tmp, [READY_BYTE])?;
                std::fs::rename(&tmp, path)
            }
        }
    }
}

/// Waits for the sentinel byte on the child's stdout.
pub(crate) async fn wait_for_byte(
    stdout: &mut ChildStdout,
    timeout: Duration,
) -> Result<(), LifecycleError> {
    match tokio::time::timeout(timeout, stdout.read_u8()).await {
        Ok(Ok(READY_BYTE)) => Ok(()),
        Ok(Ok(found)) => Err(LifecycleError::HandshakeMismatch { found }),
        Ok(Err(_)) => Err(LifecycleError::HandshakeClosed),
        Err(_) => Err(LifecycleError::HandshakeTimeout { timeout }),
    }
}

/// Polls for the marker file, giving up early if the child exits.
pub(crate) async fn wait_for_marker(
    path: &Path,
    child: &mut Child,
    timeout: Duration,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(path).await;
            return Ok(());
        }
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Err(LifecycleError::HandshakeClosed);
        }
        if Instant::now() >= deadline {
            return Err(LifecycleError::HandshakeTimeout { timeout });
        }
        tokio::time::sleep(MARKER_POLL).await;
    }
}
