//! Length-prefixed echo server.
//!
//! Each frame is a big-endian `u32` length followed by that many payload
//! bytes. Every frame received is written back unchanged.
//!
//! ```text
//! cargo run --example echo_server -- [config.toml]
//! ```
//!
//! Without a config file, settings come from `SEEKER_*` environment variables.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use seeker::error::{Result, ServerError};
use seeker::utils::logging::init_logging;
use seeker::{Config, ConnCallback, Connection, Packet, PacketReader, Protocol, Server};
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

const MAX_FRAME: usize = 1024 * 1024;

struct Frame(Bytes);

impl Packet for Frame {
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.0.len());
        buf.put_u32(self.0.len() as u32);
        buf.extend_from_slice(&self.0);
        buf.freeze()
    }
}

struct LengthPrefixed;

#[async_trait]
impl Protocol for LengthPrefixed {
    type Packet = Frame;

    async fn read_packet(&self, reader: &mut PacketReader) -> Result<Frame> {
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME {
            return Err(ServerError::OversizedPacket(len));
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(Frame(Bytes::from(payload)))
    }
}

struct Echo;

#[async_trait]
impl ConnCallback<LengthPrefixed> for Echo {
    async fn on_connect(&self, conn: &Arc<Connection<LengthPrefixed>>) -> bool {
        if let Err(e) = conn.raw_stream().set_nodelay(true) {
            warn!(error = %e, "Could not disable Nagle");
        }
        info!(conn_id = conn.id(), peer = %conn.peer_addr(), "Client connected");
        true
    }

    async fn on_message(&self, conn: &Arc<Connection<LengthPrefixed>>, frame: Frame) -> bool {
        match conn.send(frame, Duration::from_secs(1)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(conn_id = conn.id(), error = %e, "Echo failed");
                false
            }
        }
    }

    fn on_close(&self, conn: &Arc<Connection<LengthPrefixed>>) {
        info!(conn_id = conn.id(), "Client disconnected");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let server = Server::new(config.server, Arc::new(Echo), LengthPrefixed);
    let mut running = tokio::spawn({
        let server = server.clone();
        async move { server.start().await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping");
            server.stop().await;
        }
        finished = &mut running => {
            if let Ok(Err(e)) = finished {
                error!(error = %e, "Server terminated");
                return Err(e);
            }
            return Ok(());
        }
    }

    match running.await {
        Ok(result) => result,
        Err(e) => Err(ServerError::Custom(e.to_string())),
    }
}
