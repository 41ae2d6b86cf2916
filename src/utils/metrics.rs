//! Observability and Metrics
//!
//! Per-server counters for the accept loop and connection traffic.
//!
//! Uses atomic counters so every connection task can record without locking.
//! Each [`Server`](crate::service::server::Server) owns its own instance, so
//! several servers in one process keep separate figures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one server
#[derive(Debug)]
pub struct ServerMetrics {
    /// Connections accepted
    pub connections_total: AtomicU64,
    /// Connections not yet closed
    pub connections_active: AtomicU64,
    /// Connections rejected by `on_connect`
    pub connections_rejected: AtomicU64,
    /// Accept attempts that failed or timed out
    pub accept_failures: AtomicU64,
    /// Packets decoded by the protocol
    pub packets_received: AtomicU64,
    /// Packets written to the socket
    pub packets_sent: AtomicU64,
    /// Bytes written to the socket
    pub bytes_sent: AtomicU64,
    /// Sends rejected because the outbound queue was full
    pub send_buffer_full: AtomicU64,
    /// Connection tasks that panicked
    pub task_panics: AtomicU64,
    start_time: Instant,
}

impl ServerMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            accept_failures: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_buffer_full: AtomicU64::new(0),
            task_panics: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an accepted connection
    pub fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection leaving the active set
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a connection refused by the application
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a failed accept attempt
    pub fn accept_failed(&self) {
        self.accept_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decoded packet
    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet written to the socket
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a send refused for lack of queue capacity
    pub fn send_rejected(&self) {
        self.send_buffer_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a panicking connection task
    pub fn task_panicked(&self) {
        self.task_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            accept_failures: self.accept_failures.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_buffer_full: self.send_buffer_full.load(Ordering::Relaxed),
            task_panics: self.task_panics.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            accept_failures = snapshot.accept_failures,
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            bytes_sent = snapshot.bytes_sent,
            send_buffer_full = snapshot.send_buffer_full,
            task_panics = snapshot.task_panics,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub accept_failures: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_buffer_full: u64,
    pub task_panics: u64,
    pub uptime_seconds: u64,
}
