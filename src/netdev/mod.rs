//! Per-interface statistics used for RoCE PFC metrics.
//!
//! [`EthtoolStatsProvider`] wraps a low-level [`StatsClient`] (the ethtool
//! ioctl client on Linux) and adds cancellation checks, error context and
//! serialized access.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

#[cfg(target_os = "linux")]
pub mod ethtool;

/// Source of per-interface counters keyed by stat name.
pub trait NetDevStatsProvider: Send + Sync {
    fn stats(
        &self,
        cancel: &CancellationToken,
        netdev: &str,
    ) -> Result<BTreeMap<String, u64>, ProviderError>;
}

/// Raw stats reader without cancellation or locking.
pub trait StatsClient: Send {
    fn stats(&mut self, netdev: &str) -> io::Result<BTreeMap<String, u64>>;

    /// Releases OS resources held by the client.
    fn close(&mut self) {}
}

/// Ethtool-backed [`NetDevStatsProvider`].
pub struct EthtoolStatsProvider {
    client: Mutex<Option<Box<dyn StatsClient>>>,
}

impl std::fmt::Debug for EthtoolStatsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthtoolStatsProvider").finish_non_exhaustive()
    }
}

impl EthtoolStatsProvider {
    /// Opens an ethtool client on the host.
    #[cfg(target_os = "linux")]
    pub fn new() -> Result<Self, ProviderError> {
        let client = ethtool::EthtoolClient::open()
            .map_err(|e| ProviderError::Unsupported(format!("open ethtool client: {e}")))?;
        Ok(Self::with_client(Box::new(client)))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn new() -> Result<Self, ProviderError> {
        Err(ProviderError::Unsupported(
            "ethtool stats provider is supported on linux only".to_string(),
        ))
    }

    pub fn with_client(client: Box<dyn StatsClient>) -> Self {
        Self {
            client: Mutex::new(Some(client)),
        }
    }

    /// Closes the underlying client. Later calls are no-ops and later stats
    /// requests fail.
    pub fn close(&self) {
        let mut guard = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut client) = guard.take() {
            client.close();
        }
    }
}

impl NetDevStatsProvider for EthtoolStatsProvider {
    fn stats(
        &self,
        cancel: &CancellationToken,
        netdev: &str,
    ) -> Result<BTreeMap<String, u64>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let mut guard = self.client.lock().unwrap_or_else(|e| e.into_inner());

        // Waiting for the lock may have outlasted the scrape.
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let client = guard
            .as_mut()
            .ok_or_else(|| ProviderError::Unsupported("ethtool client is closed".to_string()))?;

        client.stats(netdev).map_err(|source| ProviderError::Ethtool {
            netdev: netdev.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct StubClient {
        stats: BTreeMap<String, u64>,
        fail: bool,
        calls: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl StatsClient for StubClient {
        fn stats(&mut self, _netdev: &str) -> io::Result<BTreeMap<String, u64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
            }
            Ok(self.stats.clone())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stats_returns_client_values() {
        let stats = BTreeMap::from([("rx_prio0_pause".to_string(), 10u64)]);
        let provider = EthtoolStatsProvider::with_client(Box::new(StubClient {
            stats: stats.clone(),
            ..Default::default()
        }));

        let got = provider
            .stats(&CancellationToken::new(), "ens1f0np0")
            .unwrap();
        assert_eq!(got, stats);
    }

    #[test]
    fn test_stats_wraps_client_error_with_netdev() {
        let provider = EthtoolStatsProvider::with_client(Box::new(StubClient {
            fail: true,
            ..Default::default()
        }));

        let err = provider
            .stats(&CancellationToken::new(), "ens1f0np0")
            .unwrap_err();
        assert!(matches!(err, ProviderError::Ethtool { ref netdev, .. } if netdev == "ens1f0np0"));
        assert!(err.to_string().contains("ens1f0np0"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_token_skips_client() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = EthtoolStatsProvider::with_client(Box::new(StubClient {
            calls: Arc::clone(&calls),
            ..Default::default()
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.stats(&cancel, "ens1f0np0").unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let provider = EthtoolStatsProvider::with_client(Box::new(StubClient {
            closes: Arc::clone(&closes),
            ..Default::default()
        }));

        provider.close();
        provider.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let err = provider
            .stats(&CancellationToken::new(), "ens1f0np0")
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }
}
