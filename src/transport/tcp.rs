//! # TCP Transport
//!
//! Address resolution and binding for the accept loop.
//!
//! ## Responsibilities
//! - Resolve a bind address, keeping only addresses of the configured family
//! - Bind a listener and report failures as server-fatal errors
//! - Abstract `accept` behind [`Listener`]

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument};

use crate::config::Network;
use crate::error::{constants, Result, ServerError};

/// Source of inbound streams for the accept loop
#[async_trait]
pub trait Listener: Send + 'static {
    /// Accept one inbound connection
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;

    /// Address this listener is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Resolve `address` and keep the addresses that belong to `network`
pub async fn resolve(network: Network, address: &str) -> Result<Vec<SocketAddr>> {
    let resolved = tokio::net::lookup_host(address)
        .await
        .map_err(|e| ServerError::AddressResolution {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    let addrs: Vec<SocketAddr> = resolved.filter(|addr| network.accepts(addr)).collect();
    if addrs.is_empty() {
        return Err(ServerError::AddressResolution {
            address: address.to_string(),
            reason: format!("{} ({network})", constants::ERR_NO_MATCHING_ADDRESS),
        });
    }

    debug!(%network, address, candidates = addrs.len(), "Resolved bind address");
    Ok(addrs)
}

/// Resolve and bind, trying each candidate address in order
#[instrument(skip_all, fields(address = %address, network = %network))]
pub async fn bind(network: Network, address: &str) -> Result<TcpListener> {
    let addrs = resolve(network, address).await?;

    let mut last_err = None;
    for addr in addrs {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                info!(local = %addr, "Listening");
                return Ok(listener);
            }
            Err(e) => {
                debug!(candidate = %addr, error = %e, "Bind attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(ServerError::Bind {
        address: address.to_string(),
        source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
    })
}
