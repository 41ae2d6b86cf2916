use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;

use crate::core::packet::Packet;
use crate::error::Result;

/// Buffered read half handed to [`Protocol::read_packet`].
///
/// One reader lives for the whole connection, so bytes buffered past the end
/// of one packet are still there for the next call.
pub type PacketReader = BufReader<OwnedReadHalf>;

/// Pluggable framing and decoding.
///
/// `read_packet` must wait until one complete packet is available or fail.
/// Any error ends the connection; the server logs it and runs the close path.
/// A clean end of stream should be reported as an error too, typically
/// [`ServerError::UnexpectedEof`](crate::error::ServerError::UnexpectedEof)
/// or an [`io::ErrorKind::UnexpectedEof`](std::io::ErrorKind::UnexpectedEof).
///
/// The reader task may drop a pending `read_packet` future when the
/// connection is closing, so implementations must not rely on running to
/// completion.
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use seeker::core::protocol::{PacketReader, Protocol};
/// use seeker::error::{Result, ServerError};
/// use tokio::io::AsyncBufReadExt;
///
/// struct Lines;
///
/// #[async_trait]
/// impl Protocol for Lines {
///     type Packet = String;
///
///     async fn read_packet(&self, reader: &mut PacketReader) -> Result<String> {
///         let mut line = String::new();
///         if reader.read_line(&mut line).await? == 0 {
///             return Err(ServerError::UnexpectedEof);
///         }
///         Ok(line)
///     }
/// }
/// ```
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    /// Packet type produced by this protocol and accepted for sending
    type Packet: Packet;

    /// Read the next complete packet from the stream
    async fn read_packet(&self, reader: &mut PacketReader) -> Result<Self::Packet>;
}
