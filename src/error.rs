//! # Error Types
//!
//! Error handling for the server framework.
//!
//! This module defines every error variant that can surface from server and
//! connection operations, from bind failures down to rejected sends.
//!
//! ## Error Categories
//! - **Server-fatal**: address resolution, bind, accept-failure exhaustion
//! - **Connection-fatal**: I/O, framing and decode errors raised by a [`Protocol`](crate::core::protocol::Protocol)
//! - **Caller-visible**: closed connection, full send buffer
//! - **Configuration**: invalid or unreadable configuration
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use seeker::error::{Result, ServerError};
//! use tracing::{error, info};
//!
//! fn check_limit(limit: usize) -> Result<usize> {
//!     if limit == 0 {
//!         return Err(ServerError::ConfigError("queue limit must be positive".into()));
//!     }
//!     Ok(limit)
//! }
//!
//! fn main() {
//!     match check_limit(0) {
//!         Ok(limit) => info!(limit, "Limit accepted"),
//!         Err(e) => error!(error = %e, "Rejected limit"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Send path
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_SEND_BUFFER_FULL: &str = "Send buffer full";

    /// Accept loop
    pub const ERR_ACCEPT_TIMEOUT: &str = "Accept deadline elapsed";
    pub const ERR_NO_MATCHING_ADDRESS: &str = "No address matches the configured network family";

    /// Task supervision
    pub const ERR_TASK_PANICKED: &str = "Connection task panicked";
}

// ServerError is the primary error type for all server and connection operations
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Address resolution failed for {address}: {reason}")]
    AddressResolution { address: String, reason: String },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Accept failed {failures} consecutive times, server exiting")]
    AcceptLimitExceeded { failures: u32 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send buffer full")]
    SendBufferFull,

    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ServerError {
    /// Whether this error ends the accept loop rather than a single connection
    pub fn is_server_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::AddressResolution { .. }
                | ServerError::Bind { .. }
                | ServerError::AcceptLimitExceeded { .. }
        )
    }
}

/// Type alias for Results using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;
