//! # Transport Layer
//!
//! Listening sockets for the accept loop.
//!
//! The accept loop is written against the [`Listener`] trait rather than a
//! concrete socket so that embedders can hand it a pre-bound listener and
//! tests can inject accept failures.
//!
//! ## Components
//! - **tcp**: address resolution per network family, binding, and the
//!   `Listener` impl for `tokio::net::TcpListener`

pub mod tcp;

pub use tcp::Listener;
