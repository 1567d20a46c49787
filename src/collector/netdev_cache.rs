//! Per-scrape memo of netdev stats lookups.
//!
//! Several RDMA ports can share one network interface. The cache makes sure
//! each interface is queried at most once per scrape, failures included, so
//! a broken interface is neither retried nor counted twice.

use ahash::AHashMap as HashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::netdev::NetDevStatsProvider;

pub type NetDevStats = BTreeMap<String, u64>;

/// Lives for exactly one scrape.
pub struct NetDevStatsCache<'a> {
    provider: &'a dyn NetDevStatsProvider,
    cancel: &'a CancellationToken,
    error_counter: &'a AtomicU64,
    entries: HashMap<String, Result<NetDevStats, ProviderError>>,
}

impl<'a> NetDevStatsCache<'a> {
    pub fn new(
        provider: &'a dyn NetDevStatsProvider,
        cancel: &'a CancellationToken,
        error_counter: &'a AtomicU64,
    ) -> Self {
        Self {
            provider,
            cancel,
            error_counter,
            entries: HashMap::new(),
        }
    }

    /// Returns the stats for `netdev`, fetching them on first use.
    ///
    /// A failed fetch bumps the PFC error counter once and the failure is
    /// replayed for every later lookup of the same interface.
    pub fn get(&mut self, netdev: &str) -> &Result<NetDevStats, ProviderError> {
        let provider = self.provider;
        let cancel = self.cancel;
        let error_counter = self.error_counter;

        self.entries.entry(netdev.to_string()).or_insert_with(|| {
            let result = provider.stats(cancel, netdev);
            if result.is_err() {
                error_counter.fetch_add(1, Ordering::Relaxed);
            }
            result
        })
    }

    /// Number of distinct interfaces looked up so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
