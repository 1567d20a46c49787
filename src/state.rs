//! Application state shared by the HTTP handlers, and the collector wiring
//! used by both the server and the one-shot subcommands.

use rdma_exporter::{EthtoolStatsProvider, HealthStats, RdmaCollector, SysfsProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub collector: Arc<RdmaCollector>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// `None` disables the per-scrape timeout.
    pub scrape_timeout: Option<Duration>,
    /// Whether the PFC source came up at startup.
    pub pfc_enabled: bool,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

/// Collector plus the ethtool source it reads PFC counters from, if any.
pub struct CollectorParts {
    pub collector: Arc<RdmaCollector>,
    pub ethtool: Option<Arc<EthtoolStatsProvider>>,
}

impl CollectorParts {
    pub fn pfc_enabled(&self) -> bool {
        self.ethtool.is_some()
    }

    /// Releases the ethtool socket. Safe to call more than once.
    pub fn close(&self) {
        if let Some(ethtool) = &self.ethtool {
            ethtool.close();
        }
    }
}

/// Builds the sysfs provider and collector from the effective config.
///
/// A PFC source that fails to open is logged and PFC metrics are disabled;
/// the exporter keeps serving port counters.
pub fn build_collector(config: &Config) -> CollectorParts {
    let sysfs = SysfsProvider::new();
    sysfs.set_sysfs_root(config.sysfs_root());
    sysfs.set_exclude_devices(config.exclude_devices().iter().map(String::as_str));

    let mut collector = RdmaCollector::new(Arc::new(sysfs));

    let ethtool = if config.enable_roce_pfc_metrics.unwrap_or(true) {
        match EthtoolStatsProvider::new() {
            Ok(provider) => {
                info!("RoCE PFC metrics enabled");
                Some(Arc::new(provider))
            }
            Err(e) => {
                warn!("RoCE PFC metrics disabled: {}", e);
                None
            }
        }
    } else {
        info!("RoCE PFC metrics disabled by configuration");
        None
    };

    if let Some(provider) = &ethtool {
        collector = collector.with_netdev_stats_provider(provider.clone());
    }

    CollectorParts {
        collector: Arc::new(collector),
        ethtool,
    }
}
