//! # Transport endpoints.
//!
//! Framed TCP over loopback between the controller ([`Client`]) and the
//! worker ([`Server`]). Each endpoint owns one connection at a time, runs a
//! dedicated receive task, and sorts inbound frames into one queue per
//! message kind.
//!
//! ## Rules
//! - I/O failures never escape: `send` returns `false`, `try_receive_*`
//!   returns `None`, and the endpoint flips to disconnected.
//! - Every wait takes a timeout.
//! - The server answers `Ping` with `Pong` inline in its receive task.
//! - Reconnecting joins the old receive task and flushes its queues first.
//!
//! [`WorkerLink`] is the controller-side seam used by the heartbeat monitor,
//! control loop, lifecycle manager and runtime.

mod client;
mod inbox;
mod link;
mod server;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::wire::{AlgoResult, Message, Pong};

pub use client::Client;
pub use server::Server;

/// Controller-side view of the connection to the worker.
#[async_trait]
pub trait WorkerLink: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Replaces the current connection with a fresh one to `addr`.
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> bool;

    /// Idempotent; safe to call concurrently.
    async fn disconnect(&self);

    async fn send(&self, msg: Message, timeout: Duration) -> bool;

    async fn try_receive_pong(&self, timeout: Duration) -> Option<Pong>;

    async fn try_receive_algo_result(&self, timeout: Duration) -> Option<AlgoResult>;
}
