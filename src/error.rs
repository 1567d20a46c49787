//! Error types shared by the data providers and the exposition encoder.

use std::path::PathBuf;

/// Errors returned by the device enumerator and the netdev stats source.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse counter {name}: invalid value {value:?}")]
    ParseCounter { name: String, value: String },

    #[error("collect ports for {device}: {source}")]
    Device {
        device: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("read ethtool stats for {netdev}: {source}")]
    Ethtool {
        netdev: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Returns true when the error was caused by a fired cancellation token,
    /// including cancellations wrapped in a per-device error.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ProviderError::Cancelled => true,
            ProviderError::Device { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProviderError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while turning a scrape batch into the text exposition format.
#[derive(Debug, thiserror::Error)]
pub enum ExpositionError {
    #[error("prometheus encoding failed: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("encoded metrics are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("duplicate series {name}{{{labels}}}")]
    DuplicateSeries { name: String, labels: String },
}
