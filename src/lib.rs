//! RDMA Exporter Library
//!
//! Collects RDMA adapter port counters from sysfs, plus RoCEv2 priority flow
//! control statistics from ethtool, and turns them into Prometheus samples.
//! The HTTP transport lives in the binary; everything a scrape needs is
//! here so it can be driven directly from tests or other front ends.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rdma_exporter::{encode_text, RdmaCollector, SysfsProvider};
//!
//! let provider = SysfsProvider::new();
//! provider.set_sysfs_root("/sys");
//!
//! let collector = RdmaCollector::new(Arc::new(provider));
//! let scrape = collector.collect();
//! let text = encode_text(&scrape.samples).unwrap();
//! println!("{text}");
//! ```

pub mod collector;
pub mod error;
pub mod exposition;
pub mod health_stats;
pub mod netdev;
pub mod rdma;

// Re-export main types for convenience
pub use collector::{RdmaCollector, Scrape, ScrapeOutcome};
pub use error::{ExpositionError, ProviderError};
pub use exposition::{encode_text, MetricDescriptor, MetricKind, Sample};
pub use health_stats::HealthStats;
pub use netdev::{EthtoolStatsProvider, NetDevStatsProvider};
pub use rdma::{Device, DeviceProvider, Port, PortAttributes, SysfsProvider};
