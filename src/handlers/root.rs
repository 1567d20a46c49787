//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::cli::VERSION;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>RDMA Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }}
        .container {{ max-width: 760px; margin: 0 auto; background: white; padding: 32px; border-radius: 8px; }}
        h1 {{ color: #333; border-bottom: 3px solid #007bff; padding-bottom: 12px; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ margin: 14px 0; padding: 12px; background: #f8f9fa; border-left: 4px solid #007bff; }}
        a {{ color: #007bff; font-weight: 600; text-decoration: none; }}
        .desc {{ color: #666; margin-top: 4px; }}
    </style>
</head>
<body>
<div class="container">
    <h1>RDMA Exporter</h1>
    <p>Version {version} &middot; sysfs root <code>{sysfs_root}</code> &middot; RoCE PFC metrics {pfc} &middot; uptime {uptime}</p>
    <ul>
        <li>
            <a href="{metrics_path}">{metrics_path}</a>
            <div class="desc">Prometheus metrics for RDMA ports</div>
        </li>
        <li>
            <a href="{health_path}">{health_path}</a>
            <div class="desc">Liveness check and exporter statistics (text)</div>
        </li>
    </ul>
</div>
</body>
</html>"#,
        version = VERSION,
        sysfs_root = state.config.sysfs_root().display(),
        pfc = if state.pfc_enabled { "enabled" } else { "disabled" },
        uptime = uptime_str,
        metrics_path = state.config.metrics_path(),
        health_path = state.config.health_path(),
    );

    Html(html)
}
