//! # seeker
//!
//! Connection-lifecycle core for TCP servers with a pluggable protocol.
//!
//! The crate accepts TCP connections, pulls packets off each stream through an
//! application-supplied [`Protocol`], and hands them to an application
//! [`ConnCallback`]. What it owns is everything between those two: the accept
//! loop, three tasks per connection, bounded queues in both directions, a
//! close path that runs exactly once, and a shutdown that waits for every task.
//!
//! ## Layout
//! - [`core`]: the `Packet` and `Protocol` contracts
//! - [`service`]: `Server`, `Connection` and `ConnCallback`
//! - [`transport`]: address resolution, binding and the `Listener` seam
//! - [`config`]: serde/TOML configuration with validation
//! - [`error`]: the crate error type
//! - [`utils`]: logging setup and per-server metrics
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use seeker::{ConnCallback, Connection, PacketReader, Protocol, Server, ServerConfig};
//! use seeker::error::{Result, ServerError};
//! use tokio::io::AsyncBufReadExt;
//!
//! struct Lines;
//!
//! #[async_trait]
//! impl Protocol for Lines {
//!     type Packet = String;
//!
//!     async fn read_packet(&self, reader: &mut PacketReader) -> Result<String> {
//!         let mut line = String::new();
//!         if reader.read_line(&mut line).await? == 0 {
//!             return Err(ServerError::UnexpectedEof);
//!         }
//!         Ok(line)
//!     }
//! }
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ConnCallback<Lines> for Echo {
//!     async fn on_message(&self, conn: &Arc<Connection<Lines>>, line: String) -> bool {
//!         conn.send(line, Duration::from_secs(1)).await.is_ok()
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let server = Server::new(ServerConfig::default(), Arc::new(Echo), Lines);
//! let running = tokio::spawn({
//!     let server = server.clone();
//!     async move { server.start().await }
//! });
//!
//! tokio::signal::ctrl_c().await?;
//! server.stop().await;
//! running.await.map_err(|e| ServerError::Custom(e.to_string()))??;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::{Config, Network, ServerConfig};
pub use crate::core::packet::Packet;
pub use crate::core::protocol::{PacketReader, Protocol};
pub use crate::error::{Result, ServerError};
pub use crate::service::{ConnCallback, Connection, ConnectionState, Server};
