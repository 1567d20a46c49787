//! rdma-exporter
//!
//! Prometheus exporter for RDMA adapter port counters.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use rdma_exporter::HealthStats;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_test};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{health_handler, metrics_handler, root_handler};
use state::{build_collector, AppState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), *format, *commented),
            Commands::CheckRequirements { pfc } => {
                println!("🔍 Checking Runtime Requirements");
                println!("================================\n");

                setup_logging(&args);
                let config = resolve_config(&args)?;
                match startup_checks::validate_requirements(config.sysfs_root(), *pfc) {
                    Ok(_) => {
                        println!("\n✅ All requirements met - ready for production!");
                        return Ok(());
                    }
                    Err(e) => {
                        eprintln!("\n❌ Requirements check failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            _ => {
                // Other commands need config validation
            }
        }

        let config = load_validated_config(&args)?;

        return match command {
            Commands::Check { counters } => command_check(*counters, &config),
            Commands::Test {
                iterations,
                verbose,
            } => {
                setup_logging(&args);
                command_test(*iterations, *verbose, &config)
            }
            Commands::Config { .. } => unreachable!("Config handled above"),
            Commands::CheckRequirements { .. } => unreachable!("CheckRequirements handled above"),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&args);

    info!("Starting rdma-exporter {}", cli::VERSION);

    let pfc_requested = config.enable_roce_pfc_metrics.unwrap_or(true);
    if let Err(e) = startup_checks::validate_requirements(config.sysfs_root(), false) {
        error!("❌ Startup validation failed: {}", e);
        error!("   The exporter will start but may not function correctly!");
        // Continue anyway - don't fail hard
    }

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let parts = build_collector(&config);
    if pfc_requested && !parts.pfc_enabled() {
        warn!("⚠️  RoCE PFC metrics were requested but the ethtool source is unavailable");
    }
    debug!(
        "Collector initialized with {} fixed metric families",
        parts.collector.describe().len()
    );

    let state = Arc::new(AppState {
        collector: parts.collector.clone(),
        config: Arc::new(config.clone()),
        health_stats: Arc::new(HealthStats::new()),
        scrape_timeout: config.scrape_timeout(),
        pfc_enabled: parts.pfc_enabled(),
        start_time: Instant::now(),
    });

    match state.scrape_timeout {
        Some(limit) => info!("Scrape timeout: {:?}", limit),
        None => info!("Scrape timeout disabled"),
    }

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let app = Router::new()
        .route("/", get(root_handler))
        .route(config.metrics_path(), get(metrics_handler))
        .route(config.health_path(), get(health_handler))
        .with_state(state.clone());

    let served = if config.enable_tls.unwrap_or(false) {
        // Both paths are present: validate_effective_config() checked them
        let (Some(cert_path), Some(key_path)) =
            (config.tls_cert_path.as_ref(), config.tls_key_path.as_ref())
        else {
            return Err("TLS is enabled but certificate or key path is missing".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "rdma-exporter listening on https://{}:{}{}",
            bind_ip_str,
            port,
            config.metrics_path()
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => result.map_err(Box::<dyn std::error::Error>::from),
            _ = shutdown_signal() => Ok(()),
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "rdma-exporter listening on http://{}:{}{}",
            bind_ip_str,
            port,
            config.metrics_path()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(Box::<dyn std::error::Error>::from)
    };

    parts.close();

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("rdma-exporter stopped gracefully");
    Ok(())
}
