//! Metrics endpoint handler for Prometheus scraping.
//!
//! Each request runs one collection on a blocking task and races it against
//! the configured scrape timeout. On timeout the collection's cancellation
//! token is fired and the request fails with 504 without waiting for it.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::state::SharedState;
use rdma_exporter::encode_text;

/// Prometheus text exposition content type.
const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    Timeout,
    CollectionFailed,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        match self {
            MetricsError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "scrape timed out"),
            MetricsError::CollectionFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "metrics collection failed")
            }
            MetricsError::EncodingFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
            }
        }
        .into_response()
    }
}

/// Handler for the metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<Response, MetricsError> {
    let start = Instant::now();
    debug!("Processing metrics request");

    state.health_stats.record_http_request();
    state.health_stats.record_metrics_endpoint_call();

    let cancel = CancellationToken::new();
    state.collector.set_cancellation(cancel.clone());

    let collector = Arc::clone(&state.collector);
    let collection = tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let scrape = collector.collect();
        (scrape, started.elapsed())
    });

    let joined = match state.scrape_timeout {
        Some(limit) => match tokio::time::timeout(limit, collection).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                state.collector.reset_cancellation();
                state.health_stats.record_scrape_timeout();
                warn!(timeout = ?limit, "metrics gather timed out");
                return Err(MetricsError::Timeout);
            }
        },
        None => collection.await,
    };
    state.collector.reset_cancellation();

    let (scrape, elapsed) = joined.map_err(|e| {
        error!("metrics collection task failed: {}", e);
        MetricsError::CollectionFailed
    })?;

    state.health_stats.record_scrape(
        elapsed.as_secs_f64(),
        scrape.samples.len(),
        scrape.is_aborted(),
    );

    let encode_start = Instant::now();
    let body = encode_text(&scrape.samples).map_err(|e| {
        state.health_stats.record_encode_failure();
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed
    })?;
    state
        .health_stats
        .record_encode(encode_start.elapsed().as_secs_f64() * 1000.0, body.len());

    debug!(
        samples = scrape.samples.len(),
        bytes = body.len(),
        duration = ?start.elapsed(),
        "Metrics request served"
    );

    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}
