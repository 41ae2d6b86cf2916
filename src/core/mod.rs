//! # Core Capability Contracts
//!
//! The two application-supplied capabilities the server is built around.
//!
//! This module defines what a packet is to the server and how packets are
//! pulled off a raw byte stream. Neither contract fixes a wire format.
//!
//! ## Components
//! - **Packet**: an opaque unit of application data that can render itself to bytes
//! - **Protocol**: reads the next complete packet from a connection's buffered stream
//!
//! ## Contract Notes
//! - A protocol only borrows the stream for the duration of one read
//! - Buffered bytes survive between reads, so partial frames are never lost
//! - A protocol error ends the connection it occurred on, nothing else

pub mod packet;
pub mod protocol;
