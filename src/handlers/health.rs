//! Health check endpoint handler.
//!
//! Answers `ok` followed by the exporter's internal statistics table. The
//! status is always 200: a failing scrape is reported through the error
//! counters, not through liveness.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Handler for the health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing health request");
    state.health_stats.record_http_request();

    let uptime_hours = state.health_stats.get_uptime_seconds() as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let mut collector_section = String::new();
    writeln!(collector_section, "COLLECTOR").ok();
    writeln!(collector_section, "---------").ok();
    writeln!(
        collector_section,
        "rdma_scrape_errors_total: {}",
        state.collector.scrape_errors()
    )
    .ok();
    writeln!(
        collector_section,
        "rdma_roce_pfc_scrape_errors_total: {}",
        state.collector.pfc_scrape_errors()
    )
    .ok();
    writeln!(
        collector_section,
        "roce_pfc_metrics: {}",
        if state.pfc_enabled { "enabled" } else { "disabled" }
    )
    .ok();

    let table = state.health_stats.render_table();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("ok\n\nUptime: {uptime_str}\n\n{table}\n{collector_section}"),
    )
}
