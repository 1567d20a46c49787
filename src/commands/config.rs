//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("rdma-exporter.yaml"));

    let mut content = render_config(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# RDMA Exporter Configuration
# ============================
#
# Server
# ------
# bind: "0.0.0.0"                # Bind IP (0.0.0.0 = all interfaces)
# port: 9879                     # HTTP port
# metrics_path: "/metrics"       # Prometheus scrape path
# health_path: "/healthz"        # Liveness and statistics path
#
# Collection
# ----------
# sysfs_root: "/sys"             # Root of the sysfs tree to read
# scrape_timeout_secs: 5.0       # Per-scrape deadline (0 = no timeout)
# enable_roce_pfc_metrics: true  # Read PFC pause counters through ethtool
# exclude_devices: null          # Device names to skip, e.g. ["mlx5_1"]
#
# Logging
# -------
# log_level: "info"              # off, error, warn, info, debug, trace
#
# TLS
# ---
# enable_tls: false
# tls_cert_path: null            # PEM certificate
# tls_key_path: null             # PEM private key
"#;

    format!("{comments}\n{yaml}")
}
