//! RDMA scrape orchestration.
//!
//! [`RdmaCollector`] owns the single collection entry point. Each call to
//! [`RdmaCollector::collect`] takes the collection lock, asks the device
//! provider for a snapshot and turns it into a flat batch of [`Sample`]s:
//!
//! - one counter per `counters/` and `hw_counters/` entry, named through the
//!   [`MetricRegistry`]
//! - derived RoCE PFC counters for Ethernet ports with a netdev
//! - one `rdma_port_info` gauge per port
//! - the two process-lifetime scrape error counters
//!
//! If the provider fails, the scrape is aborted and only the scrape error
//! counter is emitted.

pub mod canonical;
pub mod netdev_cache;
pub mod pfc;
pub mod registry;

use ahash::AHashSet as HashSet;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::exposition::{MetricDescriptor, MetricKind, Sample};
use crate::netdev::NetDevStatsProvider;
use crate::rdma::{DeviceProvider, Port, PortAttributes};

use netdev_cache::NetDevStatsCache;
use pfc::{parse_pfc_stat_name, PfcKind};
use registry::{CounterFamily, MetricRegistry};

pub const PORT_INFO_LABELS: &[&str] = &[
    "device",
    "port",
    "link_layer",
    "state",
    "phys_state",
    "link_width",
    "link_speed",
];

pub const PFC_LABELS: &[&str] = &["device", "port", "interface", "direction", "priority"];

/// How a scrape ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// Every device was processed and port series were emitted.
    Emitted,
    /// The device provider failed; only the scrape error counter was emitted.
    Aborted,
}

/// Result of one collection pass.
#[derive(Debug, Clone)]
pub struct Scrape {
    pub samples: Vec<Sample>,
    pub outcome: ScrapeOutcome,
}

impl Scrape {
    pub fn is_aborted(&self) -> bool {
        self.outcome == ScrapeOutcome::Aborted
    }
}

/// Descriptors that exist regardless of what the hardware reports.
#[derive(Debug)]
struct FixedDescriptors {
    port_info: Arc<MetricDescriptor>,
    pfc_frames: Arc<MetricDescriptor>,
    pfc_duration: Arc<MetricDescriptor>,
    pfc_transitions: Arc<MetricDescriptor>,
    scrape_errors: Arc<MetricDescriptor>,
    pfc_scrape_errors: Arc<MetricDescriptor>,
}

impl FixedDescriptors {
    fn new() -> Self {
        let counter = |name: &str, help: &str, labels: &'static [&'static str]| {
            Arc::new(MetricDescriptor::new(name, help, MetricKind::Counter, labels))
        };

        Self {
            port_info: Arc::new(MetricDescriptor::new(
                "rdma_port_info",
                "RDMA port metadata exported as labels.",
                MetricKind::Gauge,
                PORT_INFO_LABELS,
            )),
            pfc_frames: counter(
                "rdma_roce_pfc_pause_frames_total",
                "RoCEv2 PFC pause frame counter sourced from ethtool stats.",
                PFC_LABELS,
            ),
            pfc_duration: counter(
                "rdma_roce_pfc_pause_duration_total",
                "RoCEv2 PFC pause duration counter sourced from ethtool stats.",
                PFC_LABELS,
            ),
            pfc_transitions: counter(
                "rdma_roce_pfc_pause_transitions_total",
                "RoCEv2 PFC pause transition counter sourced from ethtool stats.",
                PFC_LABELS,
            ),
            scrape_errors: counter(
                "rdma_scrape_errors_total",
                "Total number of errors encountered while scraping RDMA sysfs.",
                &[],
            ),
            pfc_scrape_errors: counter(
                "rdma_roce_pfc_scrape_errors_total",
                "Total number of errors encountered while scraping RoCEv2 PFC ethtool stats.",
                &[],
            ),
        }
    }

    fn all(&self) -> [Arc<MetricDescriptor>; 6] {
        [
            Arc::clone(&self.port_info),
            Arc::clone(&self.pfc_frames),
            Arc::clone(&self.pfc_duration),
            Arc::clone(&self.pfc_transitions),
            Arc::clone(&self.scrape_errors),
            Arc::clone(&self.pfc_scrape_errors),
        ]
    }

    fn pfc(&self, kind: PfcKind) -> &Arc<MetricDescriptor> {
        match kind {
            PfcKind::Frames => &self.pfc_frames,
            PfcKind::Duration => &self.pfc_duration,
            PfcKind::Transitions => &self.pfc_transitions,
        }
    }
}

/// Collects RDMA port metrics from a [`DeviceProvider`].
pub struct RdmaCollector {
    provider: Arc<dyn DeviceProvider>,
    netdev_provider: Option<Arc<dyn NetDevStatsProvider>>,
    descs: FixedDescriptors,

    scrape_errors: AtomicU64,
    pfc_scrape_errors: AtomicU64,

    /// Collection lock. Also guards the identifier registry.
    registry: Mutex<MetricRegistry>,
    /// Cancellation used by the next collection.
    cancel: RwLock<CancellationToken>,
}

impl std::fmt::Debug for RdmaCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdmaCollector")
            .field("pfc_enabled", &self.netdev_provider.is_some())
            .field("scrape_errors", &self.scrape_errors())
            .field("pfc_scrape_errors", &self.pfc_scrape_errors())
            .finish_non_exhaustive()
    }
}

impl RdmaCollector {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        let descs = FixedDescriptors::new();
        let registry = MetricRegistry::with_reserved(descs.all().iter().map(|d| d.name.clone()));
        Self {
            provider,
            netdev_provider: None,
            descs,
            scrape_errors: AtomicU64::new(0),
            pfc_scrape_errors: AtomicU64::new(0),
            registry: Mutex::new(registry),
            cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Enables RoCE PFC metrics backed by `provider`.
    pub fn with_netdev_stats_provider(mut self, provider: Arc<dyn NetDevStatsProvider>) -> Self {
        self.netdev_provider = Some(provider);
        self
    }

    /// Installs the cancellation token read by the next [`collect`](Self::collect).
    /// A collection already in flight keeps the token it started with.
    pub fn set_cancellation(&self, token: CancellationToken) {
        *self.cancel.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Restores a token that is never cancelled.
    pub fn reset_cancellation(&self) {
        self.set_cancellation(CancellationToken::new());
    }

    fn current_cancellation(&self) -> CancellationToken {
        self.cancel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn scrape_errors(&self) -> u64 {
        self.scrape_errors.load(Ordering::Relaxed)
    }

    pub fn pfc_scrape_errors(&self) -> u64 {
        self.pfc_scrape_errors.load(Ordering::Relaxed)
    }

    /// Fixed descriptors followed by every per-counter descriptor allocated
    /// so far. Takes the collection lock, so it waits for a running scrape.
    pub fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut descs = self.descs.all().to_vec();
        descs.extend(registry.descriptors());
        descs
    }

    /// Runs one full collection pass.
    ///
    /// Concurrent callers are serialized on the collection lock.
    pub fn collect(&self) -> Scrape {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let cancel = self.current_cancellation();

        let devices = match self.provider.devices(&cancel) {
            Ok(devices) => devices,
            Err(err) => {
                if err.is_cancelled() || cancel.is_cancelled() {
                    warn!(error = %err, "RDMA scrape aborted by cancellation");
                } else {
                    warn!(error = %err, "RDMA scrape failed");
                }
                self.scrape_errors.fetch_add(1, Ordering::Relaxed);
                return Scrape {
                    samples: vec![self.error_sample(&self.descs.scrape_errors, &self.scrape_errors)],
                    outcome: ScrapeOutcome::Aborted,
                };
            }
        };

        let mut samples = Vec::new();
        let mut netdev_cache = self
            .netdev_provider
            .as_deref()
            .map(|provider| NetDevStatsCache::new(provider, &cancel, &self.pfc_scrape_errors));

        for device in &devices {
            let started = Instant::now();

            for port in &device.ports {
                let port_id = port.id.to_string();

                collect_port_counters(&mut registry, &mut samples, &device.name, &port_id, port);

                if let Some(cache) = netdev_cache.as_mut() {
                    self.collect_pfc(
                        cache,
                        &cancel,
                        &mut samples,
                        &device.name,
                        &port_id,
                        &port.attributes,
                    );
                }

                samples.push(self.port_info_sample(&device.name, &port_id, &port.attributes));
            }

            debug!(
                device = %device.name,
                ports = ?device.ports.iter().map(|p| p.id).collect::<Vec<_>>(),
                duration = ?started.elapsed(),
                "RDMA device scraped"
            );
        }

        samples.push(self.error_sample(&self.descs.scrape_errors, &self.scrape_errors));
        samples.push(self.error_sample(&self.descs.pfc_scrape_errors, &self.pfc_scrape_errors));

        Scrape {
            samples,
            outcome: ScrapeOutcome::Emitted,
        }
    }

    fn collect_pfc(
        &self,
        cache: &mut NetDevStatsCache<'_>,
        cancel: &CancellationToken,
        samples: &mut Vec<Sample>,
        device: &str,
        port: &str,
        attr: &PortAttributes,
    ) {
        if !attr.has_roce_netdev() {
            return;
        }

        let stats = match cache.get(&attr.netdev) {
            Ok(stats) => stats,
            Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                warn!(device, port, netdev = %attr.netdev, error = %err, "RoCE PFC scrape aborted by cancellation");
                return;
            }
            Err(err) => {
                warn!(device, port, netdev = %attr.netdev, error = %err, "RoCE PFC scrape failed");
                return;
            }
        };

        for (name, value) in stats {
            let Some(stat) = parse_pfc_stat_name(name) else {
                continue;
            };
            samples.push(Sample {
                desc: Arc::clone(self.descs.pfc(stat.kind)),
                value: *value as f64,
                label_values: vec![
                    device.to_string(),
                    port.to_string(),
                    attr.netdev.clone(),
                    stat.direction,
                    stat.priority,
                ],
            });
        }
    }

    fn port_info_sample(&self, device: &str, port: &str, attr: &PortAttributes) -> Sample {
        Sample {
            desc: Arc::clone(&self.descs.port_info),
            value: 1.0,
            label_values: vec![
                device.to_string(),
                port.to_string(),
                attr.link_layer.clone(),
                attr.state.clone(),
                attr.phys_state.clone(),
                attr.link_width.clone(),
                attr.link_speed.clone(),
            ],
        }
    }

    fn error_sample(&self, desc: &Arc<MetricDescriptor>, counter: &AtomicU64) -> Sample {
        Sample {
            desc: Arc::clone(desc),
            value: counter.load(Ordering::Relaxed) as f64,
            label_values: Vec::new(),
        }
    }
}

/// Emits the `counters/` and `hw_counters/` series of one port.
///
/// Aliases of one concept resolve to the same identifier. Only the first raw
/// name in iteration order is emitted for it; later ones are dropped.
fn collect_port_counters(
    registry: &mut MetricRegistry,
    samples: &mut Vec<Sample>,
    device: &str,
    port_id: &str,
    port: &Port,
) {
    let mut emitted: HashSet<String> = HashSet::new();

    let families: [(&BTreeMap<String, u64>, CounterFamily); 2] = [
        (&port.stats, CounterFamily::Port),
        (&port.hw_stats, CounterFamily::Hw),
    ];
    for (stats, family) in families {
        for (name, value) in stats {
            let desc = registry.descriptor_for(name, family);
            if !emitted.insert(desc.name.clone()) {
                debug!(
                    device,
                    port = port_id,
                    stat = %name,
                    metric = %desc.name,
                    "Skipping alias of an already emitted counter"
                );
                continue;
            }
            samples.push(Sample {
                desc,
                value: *value as f64,
                label_values: vec![device.to_string(), port_id.to_string()],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::rdma::Device;

    struct StaticProvider(Vec<Device>);

    impl DeviceProvider for StaticProvider {
        fn devices(&self, cancel: &CancellationToken) -> Result<Vec<Device>, ProviderError> {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            Ok(self.0.clone())
        }
    }

    fn ib_device() -> Device {
        Device {
            name: "mlx5_0".to_string(),
            ports: vec![Port {
                id: 1,
                stats: BTreeMap::from([("port_xmit_data".to_string(), 7)]),
                hw_stats: BTreeMap::new(),
                attributes: PortAttributes {
                    link_layer: "InfiniBand".to_string(),
                    state: "ACTIVE".to_string(),
                    ..Default::default()
                },
            }],
        }
    }

    #[test]
    fn test_describe_includes_fixed_and_learned_descriptors() {
        let collector = RdmaCollector::new(Arc::new(StaticProvider(vec![ib_device()])));

        let before: Vec<String> = collector.describe().iter().map(|d| d.name.clone()).collect();
        assert_eq!(before.len(), 6);
        assert!(before.contains(&"rdma_port_info".to_string()));
        assert!(!before.contains(&"rdma_port_xmit_data_total".to_string()));

        collector.collect();

        let after: Vec<String> = collector.describe().iter().map(|d| d.name.clone()).collect();
        assert_eq!(after.len(), 7);
        assert!(after.contains(&"rdma_port_xmit_data_total".to_string()));
    }

    #[test]
    fn test_cancelled_context_aborts_scrape() {
        let collector = RdmaCollector::new(Arc::new(StaticProvider(vec![ib_device()])));
        let token = CancellationToken::new();
        token.cancel();
        collector.set_cancellation(token);

        let scrape = collector.collect();
        assert!(scrape.is_aborted());
        assert_eq!(scrape.samples.len(), 1);
        assert_eq!(scrape.samples[0].name(), "rdma_scrape_errors_total");
        assert_eq!(collector.scrape_errors(), 1);

        collector.reset_cancellation();
        let scrape = collector.collect();
        assert_eq!(scrape.outcome, ScrapeOutcome::Emitted);
        assert_eq!(collector.scrape_errors(), 1);
    }

    #[test]
    fn test_port_info_labels_follow_attributes() {
        let collector = RdmaCollector::new(Arc::new(StaticProvider(vec![ib_device()])));
        let scrape = collector.collect();

        let info = scrape
            .samples
            .iter()
            .find(|s| s.name() == "rdma_port_info")
            .unwrap();
        assert_eq!(info.value, 1.0);
        assert_eq!(info.label("device"), Some("mlx5_0"));
        assert_eq!(info.label("port"), Some("1"));
        assert_eq!(info.label("link_layer"), Some("InfiniBand"));
        assert_eq!(info.label("state"), Some("ACTIVE"));
        assert_eq!(info.label("phys_state"), Some(""));
    }

    fn device_with(stats: &[(&str, u64)], hw_stats: &[(&str, u64)]) -> Device {
        let to_map = |pairs: &[(&str, u64)]| {
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect::<BTreeMap<_, _>>()
        };
        let mut device = ib_device();
        device.ports[0].stats = to_map(stats);
        device.ports[0].hw_stats = to_map(hw_stats);
        device
    }

    #[test]
    fn test_counter_named_like_fixed_family_gets_its_own_identifier() {
        let device = device_with(&[("roce_pfc_pause_frames", 2)], &[("scrape_errors", 9)]);
        let collector = RdmaCollector::new(Arc::new(StaticProvider(vec![device])));
        let scrape = collector.collect();

        let fixed: Vec<&Sample> = scrape
            .samples
            .iter()
            .filter(|s| {
                s.name() == "rdma_scrape_errors_total"
                    || s.name() == "rdma_roce_pfc_pause_frames_total"
            })
            .collect();
        assert_eq!(fixed.len(), 1);
        assert!(fixed[0].label_values.is_empty());

        let text = crate::exposition::encode_text(&scrape.samples).unwrap();
        assert!(text.contains("rdma_scrape_errors_total 0"));
        assert!(text.contains(r#"{device="mlx5_0",port="1"} 9"#));
        assert!(text.contains(r#"{device="mlx5_0",port="1"} 2"#));
    }

    #[test]
    fn test_aliases_on_one_port_emit_a_single_series() {
        let device = device_with(&[("symbol_error", 3), ("symbol_errors", 4)], &[]);
        let collector = RdmaCollector::new(Arc::new(StaticProvider(vec![device])));
        let scrape = collector.collect();

        let series: Vec<&Sample> = scrape
            .samples
            .iter()
            .filter(|s| s.name() == "rdma_symbol_error_total")
            .collect();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 3.0);

        let text = crate::exposition::encode_text(&scrape.samples).unwrap();
        assert!(text.contains(r#"rdma_symbol_error_total{device="mlx5_0",port="1"} 3"#));
    }

    #[test]
    fn test_alias_dedup_is_per_port() {
        let mut device = device_with(&[("symbol_error", 3)], &[]);
        let mut second = device.ports[0].clone();
        second.id = 2;
        second.stats = BTreeMap::from([("symbol_errors".to_string(), 5)]);
        device.ports.push(second);

        let collector = RdmaCollector::new(Arc::new(StaticProvider(vec![device])));
        let scrape = collector.collect();

        let values: Vec<(Option<&str>, f64)> = scrape
            .samples
            .iter()
            .filter(|s| s.name() == "rdma_symbol_error_total")
            .map(|s| (s.label("port"), s.value))
            .collect();
        assert_eq!(values, vec![(Some("1"), 3.0), (Some("2"), 5.0)]);
    }
}
