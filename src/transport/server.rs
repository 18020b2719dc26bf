//! Worker-side endpoint.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};

use crate::clock;
use crate::wire::{Message, Pong, SensorFrame};

use super::inbox::Inbox;
use super::link::{Link, Route};

const INBOX_CAPACITY: usize = 256;
const PONG_TIMEOUT: Duration = Duration::from_millis(50);

struct ServerRouter {
    frames: Inbox<SensorFrame>,
    pongs_sent: AtomicU64,
}

impl Route for ServerRouter {
    fn route(&self, msg: Message) -> Option<Message> {
        match msg {
            Message::Ping(ping) => {
                self.pongs_sent.fetch_add(1, Ordering::Relaxed);
                Some(Message::Pong(Pong {
                    seq: ping.seq,
                    t0_ns: ping.t0_ns,
                    t1_ns: clock::now_ns(),
                }))
            }
            Message::SensorFrame(frame) => {
                self.frames.push(frame);
                None
            }
            _ => None,
        }
    }

    fn clear(&self) {
        self.frames.clear();
    }

    fn wake_all(&self) {
        self.frames.wake_all();
    }
}

/// Listens for a single controller connection.
///
/// Pings are answered from the receive task itself, so heartbeat latency
/// does not depend on how many sensor frames are waiting to be consumed.
pub struct Server {
    listener: TcpListener,
    link: Link<ServerRouter>,
}

impl Server {
    /// Binds the listening socket. Bind before signalling readiness.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let router = ServerRouter {
            frames: Inbox::new(INBOX_CAPACITY),
            pongs_sent: AtomicU64::new(0),
        };
        Ok(Self {
            listener,
            link: Link::new(router, PONG_TIMEOUT),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits up to `timeout` for a controller, replacing any current session.
    pub async fn accept(&self, timeout: Duration) -> bool {
        self.link.disconnect().await;
        match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(Ok((stream, _peer))) => {
                self.link.attach(stream).await;
                true
            }
            _ => false,
        }
    }

    pub async fn disconnect(&self) {
        self.link.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub async fn send(&self, msg: impl Into<Message>, timeout: Duration) -> bool {
        self.link.send(&msg.into(), timeout).await
    }

    pub async fn try_receive_sensor_frame(&self, timeout: Duration) -> Option<SensorFrame> {
        let flag = self.link.connected_flag();
        self.link.router().frames.pop(timeout, flag).await
    }

    /// Pongs produced by the receive task since bind.
    pub fn pongs_sent(&self) -> u64 {
        self.link.router().pongs_sent.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.link.dropped_frames()
    }
}
