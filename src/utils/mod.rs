//! # Utility Modules
//!
//! Supporting utilities for observability.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: per-server atomic counters with point-in-time snapshots

pub mod logging;
pub mod metrics;

pub use metrics::{MetricsSnapshot, ServerMetrics};
