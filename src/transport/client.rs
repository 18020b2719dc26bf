//! Controller-side endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::wire::{AlgoResult, Message, Pong};

use super::WorkerLink;
use super::inbox::Inbox;
use super::link::{Link, Route};

const INBOX_CAPACITY: usize = 256;

struct ClientRouter {
    pongs: Inbox<Pong>,
    results: Inbox<AlgoResult>,
}

impl Route for ClientRouter {
    fn route(&self, msg: Message) -> Option<Message> {
        match msg {
            Message::Pong(p) => self.pongs.push(p),
            Message::AlgoResult(r) => self.results.push(r),
            _ => {}
        }
        None
    }

    fn clear(&self) {
        self.pongs.clear();
        self.results.clear();
    }

    fn wake_all(&self) {
        self.pongs.wake_all();
        self.results.wake_all();
    }
}

/// Connects to a worker and demultiplexes its replies.
///
/// Pongs and algorithm results land in separate queues, so a backlog of
/// results never delays heartbeat replies.
///
/// # Example
/// ```no_run
/// # async fn demo() {
/// use std::time::Duration;
/// use algovisor::transport::Client;
/// use algovisor::wire::Ping;
///
/// let client = Client::new();
/// if client.connect("127.0.0.1:45678".parse().unwrap(), Duration::from_millis(500)).await {
///     client.send(Ping { seq: 1, t0_ns: 0 }, Duration::from_millis(50)).await;
///     let pong = client.try_receive_pong(Duration::from_millis(200)).await;
///     println!("{pong:?}");
/// }
/// # }
/// ```
pub struct Client {
    link: Link<ClientRouter>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        let router = ClientRouter {
            pongs: Inbox::new(INBOX_CAPACITY),
            results: Inbox::new(INBOX_CAPACITY),
        };
        // Clients never answer inline, the reply timeout is unused.
        Self {
            link: Link::new(router, Duration::ZERO),
        }
    }

    /// Connects to `addr`, replacing any previous connection.
    ///
    /// The previous receive task is joined and queued replies are discarded
    /// before the new attempt, so nothing from an older session leaks through.
    pub async fn connect(&self, addr: SocketAddr, timeout: Duration) -> bool {
        self.link.disconnect().await;
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
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

    pub async fn try_receive_pong(&self, timeout: Duration) -> Option<Pong> {
        let flag = self.link.connected_flag();
        self.link.router().pongs.pop(timeout, flag).await
    }

    pub async fn try_receive_algo_result(&self, timeout: Duration) -> Option<AlgoResult> {
        let flag = self.link.connected_flag();
        self.link.router().results.pop(timeout, flag).await
    }

    /// Frames discarded by the receive task for protocol errors.
    pub fn dropped_frames(&self) -> u64 {
        self.link.dropped_frames()
    }
}

#[async_trait]
impl WorkerLink for Client {
    fn is_connected(&self) -> bool {
        Client::is_connected(self)
    }

    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> bool {
        Client::connect(self, addr, timeout).await
    }

    async fn disconnect(&self) {
        Client::disconnect(self).await
    }

    async fn send(&self, msg: Message, timeout: Duration) -> bool {
        Client::send(self, msg, timeout).await
    }

    async fn try_receive_pong(&self, timeout: Duration) -> Option<Pong> {
        Client::try_receive_pong(self, timeout).await
    }

    async fn try_receive_algo_result(&self, timeout: Duration) -> Option<AlgoResult> {
        Client::try_receive_algo_result(self, timeout).await
    }
}
