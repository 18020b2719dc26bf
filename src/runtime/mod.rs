//! # Controller runtime.
//!
//! - [`RuntimeBuilder`] wires collaborators (real or injected)
//! - [`ControllerRuntime`] the supervisor loop and ordered shutdown
//!
//! ## Hysteresis
//! Two tiers keep transient jitter from causing restart storms:
//! the heartbeat monitor needs `miss_threshold` consecutive missed rounds
//! before reporting unhealthy, and the runtime needs
//! `unhealthy_restart_threshold` consecutive unhealthy iterations, outside
//! the post-connect grace window and after the worker has been healthy at
//! least once, before it restarts the worker.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use algovisor::{Config, LogWriter, RuntimeBuilder, Subscribe};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = RuntimeBuilder::new(Config::default())
//!         .with_subscribers(vec![Arc::new(LogWriter) as Arc<dyn Subscribe>])
//!         .build();
//!     runtime.start();
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     println!("{:?}", runtime.status().system_state);
//!     runtime.stop().await;
//! }
//! ```

mod builder;
mod controller;
mod supervision;

pub use builder::RuntimeBuilder;
pub use controller::ControllerRuntime;
