//! CLI arguments and subcommands for rdma-exporter.
//!
//! Every server option can also be set through an `RDMA_EXPORTER_*`
//! environment variable; an explicit flag wins over the environment.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Version string including the commit the binary was built from.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("VERGEN_GIT_SHA"),
    ")"
);

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "rdma-exporter",
    about = "Prometheus exporter for RDMA port counters and RoCEv2 PFC statistics",
    long_about = "Prometheus exporter for RDMA port counters and RoCEv2 PFC statistics.\n\n\
                  Reads InfiniBand/RoCE adapter counters from sysfs, maps them to stable \
                  metric names and optionally adds per-priority pause frame counters \
                  read through ethtool.",
    version = VERSION,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long, env = "RDMA_EXPORTER_PORT")]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long, env = "RDMA_EXPORTER_BIND")]
    pub bind: Option<IpAddr>,

    /// HTTP path under which metrics are served
    #[arg(long, env = "RDMA_EXPORTER_METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// HTTP path for health checks
    #[arg(long, env = "RDMA_EXPORTER_HEALTH_PATH")]
    pub health_path: Option<String>,

    /// Root of the sysfs tree to read RDMA data from
    #[arg(long, env = "RDMA_EXPORTER_SYSFS_ROOT")]
    pub sysfs_root: Option<PathBuf>,

    /// Maximum seconds to spend collecting per scrape (0 disables)
    #[arg(long, env = "RDMA_EXPORTER_SCRAPE_TIMEOUT")]
    pub scrape_timeout: Option<f64>,

    /// Export RoCEv2 PFC pause counters read through ethtool
    #[arg(
        long,
        env = "RDMA_EXPORTER_ENABLE_ROCE_PFC_METRICS",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub enable_roce_pfc_metrics: Option<bool>,

    /// RDMA devices to skip (comma-separated)
    #[arg(long, env = "RDMA_EXPORTER_EXCLUDE_DEVICES")]
    pub exclude_devices: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", env = "RDMA_EXPORTER_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify that the sysfs tree is readable and list RDMA devices
    Check {
        /// Also print every counter found per port
        #[arg(long)]
        counters: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run one-shot scrapes and print the result
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print the full exposition text instead of a summary
        #[arg(long)]
        verbose: bool,
    },

    /// Check runtime requirements and permissions
    CheckRequirements {
        /// Also require the ethtool socket used for PFC metrics
        #[arg(long)]
        pfc: bool,
    },
}
