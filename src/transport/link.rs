//! # Connection core shared by both endpoint roles.
//!
//! [`Link`] owns at most one TCP session: the write half behind the
//! connection-wide send lock, and a receive task that decodes frames and hands
//! them to a role-specific [`Route`].
//!
//! ## Architecture
//! ```text
//!            send(msg) ──► [writer lock] ──► OwnedWriteHalf ──► socket
//!                                ▲
//!                                │ inline reply (Route::route returns Some)
//!  socket ──► OwnedReadHalf ──► receive task ──► Route::route(msg) ──► Inbox<T>
//!                                   │
//!                                   └─ cancelled by disconnect(), joined before reuse
//! ```
//!
//! ## Rules
//! - `disconnect()` is the only place that joins the receive task; it is
//!   idempotent and serialised by the session lock.
//! - `attach()` tears down any previous session and flushes the inboxes first.
//! - Send failures and receive failures flip `connected` to false and wake
//!   all inbox waiters; nothing is retried here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ProtocolError;
use crate::wire::{self, HEADER_LEN, MAX_PAYLOAD, Message};

/// Role-specific demultiplexer.
pub(crate) trait Route: Send + Sync + 'static {
    /// Handles one decoded message. A returned message is written back
    /// from the receive task before the next frame is read.
    fn route(&self, msg: Message) -> Option<Message>;

    /// Drops stale queued messages.
    fn clear(&self);

    /// Wakes waiters after the connection went away.
    fn wake_all(&self);
}

struct Shared {
    connected: AtomicBool,
    dropped_frames: AtomicU64,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl Shared {
    /// Writes one frame under the send lock.
    ///
    /// Lock contention past `timeout` fails the send but leaves the
    /// connection alone; a failed or timed-out write marks it down.
    async fn write_frame(&self, msg: &Message, timeout: Duration) -> bool {
        let bytes = wire::encode(msg);
        let deadline = tokio::time::Instant::now() + timeout;

        let Ok(mut guard) = tokio::time::timeout_at(deadline, self.writer.lock()).await else {
            return false;
        };
        let Some(writer) = guard.as_mut() else {
            return false;
        };

        match tokio::time::timeout_at(deadline, writer.write_all(&bytes)).await {
            Ok(Ok(())) => true,
            _ => {
                self.connected.store(false, Ordering::Release);
                false
            }
        }
    }
}

struct Session {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub(crate) struct Link<R: Route> {
    router: Arc<R>,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
    reply_timeout: Duration,
}

impl<R: Route> Link<R> {
    pub(crate) fn new(router: R, reply_timeout: Duration) -> Self {
        Self {
            router: Arc::new(router),
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                dropped_frames: AtomicU64::new(0),
                writer: Mutex::new(None),
            }),
            session: Mutex::new(None),
            reply_timeout,
        }
    }

    pub(crate) fn router(&self) -> &R {
        &self.router
    }

    pub(crate) fn connected_flag(&self) -> &AtomicBool {
        &self.shared.connected
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub(crate) fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Takes ownership of a fresh stream and starts its receive task.
    pub(crate) async fn attach(&self, stream: TcpStream) {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;

        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        *self.shared.writer.lock().await = Some(writer);
        self.router.clear();
        self.shared.connected.store(true, Ordering::Release);

        let token = CancellationToken::new();
        let task = tokio::spawn(receive_loop(
            reader,
            Arc::clone(&self.shared),
            Arc::clone(&self.router),
            token.clone(),
            self.reply_timeout,
        ));
        *session = Some(Session { token, task });
    }

    pub(crate) async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;
    }

    async fn teardown(&self, session: &mut Option<Session>) {
        self.shared.connected.store(false, Ordering::Release);
        if let Some(old) = session.take() {
            old.token.cancel();
            let _ = old.task.await;
        }
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.router.wake_all();
    }

    pub(crate) async fn send(&self, msg: &Message, timeout: Duration) -> bool {
        if !self.is_connected() {
            return false;
        }
        let sent = self.shared.write_frame(msg, timeout).await;
        if !sent && !self.is_connected() {
            self.router.wake_all();
        }
        sent
    }
}

async fn receive_loop<R: Route>(
    mut reader: OwnedReadHalf,
    shared: Arc<Shared>,
    router: Arc<R>,
    token: CancellationToken,
    reply_timeout: Duration,
) {
    let mut header = [0u8; HEADER_LEN];
    let mut payload = vec![0u8; MAX_PAYLOAD as usize];

    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => return,
            res = read_frame(&mut reader, &mut header, &mut payload) => res,
        };

        match frame {
            Ok(Ok(msg)) => {
                if let Some(reply) = router.route(msg) {
                    let sent = shared.write_frame(&reply, reply_timeout).await;
                    if !sent && !shared.connected.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
            Ok(Err(err)) => {
                shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
                if err.breaks_framing() {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    shared.connected.store(false, Ordering::Release);
    router.wake_all();
}

/// Reads one frame. The outer error is transport failure, the inner one a
/// dropped frame whose bytes have already been consumed when possible.
async fn read_frame(
    reader: &mut OwnedReadHalf,
    header: &mut [u8; HEADER_LEN],
    payload: &mut [u8],
) -> std::io::Result<Result<Message, ProtocolError>> {
    reader.read_exact(header).await?;
    let parsed = match wire::decode_header(header) {
        Ok(h) => h,
        Err(err) => return Ok(Err(err)),
    };

    let body = &mut payload[..parsed.payload_size as usize];
    reader.read_exact(body).await?;
    Ok(wire::decode_payload(&parsed, body))
}
