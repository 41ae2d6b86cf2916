use std::sync::Arc;

use async_trait::async_trait;

use crate::core::protocol::Protocol;
use crate::service::connection::Connection;

/// Application hooks for connection events.
///
/// One instance is shared by every connection of a server. Hooks run on the
/// connection's own tasks: `on_connect` on the accept handler, `on_message`
/// on the dispatcher, and `on_close` on whichever task wins the close.
#[async_trait]
pub trait ConnCallback<P: Protocol>: Send + Sync + 'static {
    /// A stream was accepted. Returning `false` drops it before any task starts;
    /// no other hook fires for that connection.
    async fn on_connect(&self, _conn: &Arc<Connection<P>>) -> bool {
        true
    }

    /// A packet was decoded. Returning `false` closes the connection after it.
    async fn on_message(&self, conn: &Arc<Connection<P>>, packet: P::Packet) -> bool;

    /// Last step of the close path. Fires exactly once per connection that
    /// passed `on_connect`.
    fn on_close(&self, _conn: &Arc<Connection<P>>) {}
}
