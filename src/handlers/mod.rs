//! HTTP endpoint handlers for the exporter.
//!
//! - metrics path (default `/metrics`): Prometheus metrics endpoint
//! - health path (default `/healthz`): liveness plus internal statistics
//! - `/`: landing page

pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
