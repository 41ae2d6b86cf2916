//! # Service Layer
//!
//! The accept loop and the per-connection task triad.
//!
//! ## Components
//! - **Server**: binds, accepts with a bounded failure budget, tracks every task for shutdown
//! - **Connection**: reader, writer and dispatcher tasks around two bounded queues
//! - **ConnCallback**: application hooks for connect, message and close events
//!
//! ## Lifecycle
//! ```text
//! accept -> on_connect -> [reader | writer | dispatcher] -> close -> on_close
//! ```
//! Every task ends by calling `Connection::close`, which runs its teardown once.

pub mod callback;
pub mod connection;
pub mod server;

pub use callback::ConnCallback;
pub use connection::{Connection, ConnectionState};
pub use server::Server;
