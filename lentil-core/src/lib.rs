//! # lentil-core
//!
//! Client library for the [beanstalkd] work queue.
//!
//! This crate contains:
//! - **Commands**: `Command`, one variant per protocol command, rendered to wire lines
//! - **Codec**: `BeanstalkCodec` for framed TCP I/O via `tokio_util`, including
//!   declared-length job bodies and statistics blocks
//! - **Network**: `Transport` over any async stream, plus the `Observer` hook
//!   for watching raw traffic
//! - **Client**: `Client`, one async method per command
//! - **Reconnect**: `ReconnectingClient`, which redials and restores used and
//!   watched tubes after connection loss
//! - **Error**: `LentilError`, a `thiserror`-based error hierarchy
//!
//! ```no_run
//! # async fn run() -> Result<(), lentil_core::LentilError> {
//! let mut queue = lentil_core::Client::connect("127.0.0.1:11300").await?;
//! let id = queue.put(0, 0, 60, "job body").await?;
//! let job = queue.reserve().await?;
//! assert_eq!(job.id, id);
//! queue.delete(job.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [beanstalkd]: https://beanstalkd.github.io/

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod job;
pub mod network;
pub mod reconnect;
pub mod reply;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{Client, DEFAULT_TUBE};
pub use codec::{BeanstalkCodec, Frame};
pub use command::Command;
pub use config::{ClientConfig, ReconnectConfig};
pub use error::{FailureKind, LentilError};
pub use job::Job;
pub use network::{NoopObserver, Observer, TracingObserver, Transport};
pub use reconnect::ReconnectingClient;
pub use reply::{parse_list, parse_map};
