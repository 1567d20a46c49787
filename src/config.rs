//! Configuration management for rdma-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9879;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_HEALTH_PATH: &str = "/healthz";
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";
pub const DEFAULT_SCRAPE_TIMEOUT_SECS: f64 = 5.0;

const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/rdma-exporter/config.yaml",
    "/etc/rdma-exporter/config.yml",
    "/etc/rdma-exporter/config.json",
    "./rdma-exporter.yaml",
    "./rdma-exporter.yml",
    "./rdma-exporter.json",
];

/// Exporter configuration. `None` means "use the default".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "metrics-path")]
    pub metrics_path: Option<String>,
    #[serde(alias = "health-path")]
    pub health_path: Option<String>,

    // Collection
    #[serde(alias = "sysfs-root")]
    pub sysfs_root: Option<PathBuf>,
    /// Seconds; 0 disables the timeout.
    #[serde(alias = "scrape-timeout-secs")]
    pub scrape_timeout_secs: Option<f64>,
    #[serde(alias = "enable-roce-pfc-metrics")]
    pub enable_roce_pfc_metrics: Option<bool>,
    #[serde(alias = "exclude-devices")]
    pub exclude_devices: Option<Vec<String>>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            metrics_path: Some(DEFAULT_METRICS_PATH.to_string()),
            health_path: Some(DEFAULT_HEALTH_PATH.to_string()),
            sysfs_root: Some(PathBuf::from(DEFAULT_SYSFS_ROOT)),
            scrape_timeout_secs: Some(DEFAULT_SCRAPE_TIMEOUT_SECS),
            enable_roce_pfc_metrics: Some(true),
            exclude_devices: None,
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn metrics_path(&self) -> &str {
        self.metrics_path.as_deref().unwrap_or(DEFAULT_METRICS_PATH)
    }

    pub fn health_path(&self) -> &str {
        self.health_path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH)
    }

    pub fn sysfs_root(&self) -> &Path {
        self.sysfs_root
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SYSFS_ROOT))
    }

    /// `None` when the timeout is disabled.
    pub fn scrape_timeout(&self) -> Option<Duration> {
        let secs = self.scrape_timeout_secs.unwrap_or(DEFAULT_SCRAPE_TIMEOUT_SECS);
        if secs > 0.0 && secs.is_finite() {
            Some(Duration::from_secs_f64(secs))
        } else {
            None
        }
    }

    pub fn exclude_devices(&self) -> &[String] {
        self.exclude_devices.as_deref().unwrap_or(&[])
    }
}

/// Splits a comma separated device list, trimming entries and dropping
/// empty ones.
pub fn parse_device_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let metrics_path = cfg.metrics_path();
    let health_path = cfg.health_path();

    if !metrics_path.starts_with('/') {
        return Err(format!("metrics_path must start with '/': {metrics_path}").into());
    }
    if !health_path.starts_with('/') {
        return Err(format!("health_path must start with '/': {health_path}").into());
    }
    if metrics_path == health_path {
        return Err(format!("metrics_path and health_path must differ: {metrics_path}").into());
    }
    if metrics_path == "/" || health_path == "/" {
        return Err("metrics_path and health_path must not be '/'".into());
    }

    if let Some(secs) = cfg.scrape_timeout_secs {
        if !secs.is_finite() || secs < 0.0 {
            return Err(format!("scrape_timeout_secs must be a non-negative number: {secs}").into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if !matches!(
            level.to_ascii_lowercase().as_str(),
            "off" | "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(format!("Invalid log_level '{level}'").into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "TLS certificate")?;
                check_pem_file(key, "TLS private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("{what} file is empty: {path}").into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("{what} file not found: {path}").into())
        }
        Err(e) => Err(format!("{what} file is not readable: {path} ({e})").into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI/env (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(path) = &args.metrics_path {
        config.metrics_path = Some(path.clone());
    }
    if let Some(path) = &args.health_path {
        config.health_path = Some(path.clone());
    }
    if let Some(root) = &args.sysfs_root {
        config.sysfs_root = Some(root.clone());
    }
    if let Some(secs) = args.scrape_timeout {
        config.scrape_timeout_secs = Some(secs);
    }
    if let Some(enabled) = args.enable_roce_pfc_metrics {
        config.enable_roce_pfc_metrics = Some(enabled);
    }
    if let Some(devices) = &args.exclude_devices {
        config.exclude_devices = Some(parse_device_list(devices));
    }

    config.log_level = Some(format!("{:?}", args.log_level).to_ascii_lowercase());

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Loads a config file, or the first default location that exists.
/// Missing files yield the default configuration.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, &path)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(merge_defaults(config))
}

fn parse_config(content: &str, path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    })
}

/// Fills keys the file left out with their defaults.
fn merge_defaults(file: Config) -> Config {
    let d = Config::default();
    Config {
        port: file.port.or(d.port),
        bind: file.bind.or(d.bind),
        metrics_path: file.metrics_path.or(d.metrics_path),
        health_path: file.health_path.or(d.health_path),
        sysfs_root: file.sysfs_root.or(d.sysfs_root),
        scrape_timeout_secs: file.scrape_timeout_secs.or(d.scrape_timeout_secs),
        enable_roce_pfc_metrics: file.enable_roce_pfc_metrics.or(d.enable_roce_pfc_metrics),
        exclude_devices: file.exclude_devices.or(d.exclude_devices),
        log_level: file.log_level.or(d.log_level),
        enable_tls: file.enable_tls.or(d.enable_tls),
        tls_cert_path: file.tls_cert_path.or(d.tls_cert_path),
        tls_key_path: file.tls_key_path.or(d.tls_key_path),
    }
}

/// Renders a config in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
