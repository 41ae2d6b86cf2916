//! # Server
//!
//! Accept loop and shutdown coordination.
//!
//! ## Accept Loop
//! Each iteration waits at most `accept_timeout` for a client. A timeout
//! (when `count_accept_timeouts` is set) or an accept error adds one to a
//! consecutive-failure counter and a successful accept resets it. Once the
//! counter passes `accept_error_limit` the loop gives up and `serve` returns
//! [`ServerError::AcceptLimitExceeded`].
//!
//! ## Shutdown
//! [`Server::stop`] cancels the shutdown token, which every accept iteration
//! and every connection task selects on, then waits on the task tracker until
//! the accept loop and all connection tasks have exited.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::protocol::Protocol;
use crate::error::{constants, Result, ServerError};
use crate::service::callback::ConnCallback;
use crate::service::connection::Connection;
use crate::transport::tcp::{self, Listener};
use crate::utils::metrics::ServerMetrics;

struct ServerInner<P: Protocol> {
    config: ServerConfig,
    callback: Arc<dyn ConnCallback<P>>,
    protocol: Arc<P>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    metrics: ServerMetrics,
    next_conn_id: AtomicU64,
}

/// TCP server handle. Clones share the same server.
pub struct Server<P: Protocol> {
    inner: Arc<ServerInner<P>>,
}

impl<P: Protocol> Clone for Server<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Protocol> Server<P> {
    pub fn new(config: ServerConfig, callback: Arc<dyn ConnCallback<P>>, protocol: P) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                callback,
                protocol: Arc::new(protocol),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                metrics: ServerMetrics::new(),
                next_conn_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.inner.metrics
    }

    /// True once `stop` has been called
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub(crate) fn callback(&self) -> Arc<dyn ConnCallback<P>> {
        Arc::clone(&self.inner.callback)
    }

    pub(crate) fn protocol(&self) -> Arc<P> {
        Arc::clone(&self.inner.protocol)
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    /// Bind the configured address and run the accept loop.
    ///
    /// Returns `Ok(())` after `stop`, or the error that ended the server:
    /// a resolution or bind failure before the loop starts, or
    /// [`ServerError::AcceptLimitExceeded`] once accepts keep failing.
    #[instrument(skip(self), fields(network = %self.inner.config.network, address = %self.inner.config.bind_address))]
    pub async fn start(&self) -> Result<()> {
        let config = &self.inner.config;
        let listener = match tcp::bind(config.network, &config.bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to start listener");
                return Err(e);
            }
        };

        self.serve(listener).await
    }

    /// Run the accept loop on an already bound listener
    pub async fn serve<L: Listener>(&self, mut listener: L) -> Result<()> {
        // the accept loop counts as a tracked task for `stop`
        let _running = self.inner.tracker.token();

        let config = &self.inner.config;
        let shutdown = &self.inner.shutdown;
        let limit = config.accept_error_limit;
        let mut failures: u32 = 0;

        match listener.local_addr() {
            Ok(local) => info!(%local, limit, "Accept loop started"),
            Err(_) => info!(limit, "Accept loop started"),
        }

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, accept loop exiting");
                return Ok(());
            }

            let attempt = tokio::select! {
                biased;
                _ = shutdown.cancelled() => continue,
                attempt = tokio::time::timeout(config.accept_timeout, listener.accept()) => attempt,
            };

            let reason = match attempt {
                Ok(Ok((stream, peer))) => {
                    failures = 0;
                    self.spawn_connection(stream, peer);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) if !config.count_accept_timeouts => continue,
                Err(_) => constants::ERR_ACCEPT_TIMEOUT.to_string(),
            };

            self.inner.metrics.accept_failed();
            if count_failure(&mut failures, limit) {
                error!(failures, limit, error = %reason, "Accept failure limit exceeded, server exiting");
                return Err(ServerError::AcceptLimitExceeded { failures });
            }
            debug!(failures, limit, error = %reason, "Accept failed, retrying");
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;

        let (conn, io) = match Connection::new(id, stream, self.clone()) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(conn_id = id, %peer, error = %e, "Failed to set up connection");
                return;
            }
        };

        self.inner.metrics.connection_accepted();
        debug!(conn_id = id, %peer, "Accepted connection");
        self.inner.tracker.spawn(conn.handle(io));
    }

    /// Signal shutdown and wait until the accept loop and every connection
    /// task have exited. Calling it again, or before `start`, is harmless.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();

        info!(
            tasks = self.inner.tracker.len(),
            "Shutdown signalled, waiting for tasks"
        );
        self.inner.tracker.wait().await;

        self.inner.metrics.log_metrics();
        info!("Server stopped");
    }
}

/// Count one more consecutive accept failure. True once the budget is spent.
fn count_failure(failures: &mut u32, limit: u32) -> bool {
    *failures = failures.saturating_add(1);
    *failures > limit
}
