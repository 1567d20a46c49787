//! RDMA device snapshot model and the provider that produces it.
//!
//! A [`DeviceProvider`] returns a fully materialized list of adapters and
//! their ports for one scrape. The default implementation reads
//! `/sys/class/infiniband`.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

pub mod sysfs;

pub use sysfs::SysfsProvider;

/// Link layer reported by Ethernet (RoCE) ports.
pub const LINK_LAYER_ETHERNET: &str = "Ethernet";

/// A single RDMA host channel adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub ports: Vec<Port>,
}

/// Counters and metadata for one adapter port.
///
/// Counter maps are ordered by name so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Port {
    pub id: u32,
    /// `counters/` directory.
    pub stats: BTreeMap<String, u64>,
    /// `hw_counters/` directory; empty when the driver has none.
    pub hw_stats: BTreeMap<String, u64>,
    pub attributes: PortAttributes,
}

/// Descriptive port metadata. Missing files are reported as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortAttributes {
    pub link_layer: String,
    pub state: String,
    pub phys_state: String,
    pub link_width: String,
    pub link_speed: String,
    /// Associated network interface, only meaningful for Ethernet ports.
    pub netdev: String,
}

impl PortAttributes {
    /// True when the port runs RoCE and has a network interface to query.
    pub fn has_roce_netdev(&self) -> bool {
        self.link_layer == LINK_LAYER_ETHERNET && !self.netdev.is_empty()
    }
}

/// Source of device snapshots.
///
/// Implementations must return promptly with [`ProviderError::Cancelled`]
/// once `cancel` fires, and must never hand out a partially read snapshot.
pub trait DeviceProvider: Send + Sync {
    fn devices(&self, cancel: &CancellationToken) -> Result<Vec<Device>, ProviderError>;
}
