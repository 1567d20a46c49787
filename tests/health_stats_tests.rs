//! Integration tests for the health stats module.
//!
//! These tests verify that HealthStats tracks scrape outcomes, encode
//! timings and HTTP activity, and that the rendered table reports them.

use rdma_exporter::health_stats::HealthStats;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn test_health_stats_initialize_empty() {
    let stats = HealthStats::new();

    let snap = stats.scrape_duration_seconds.snapshot();
    assert_eq!(snap.count, 0);
    assert_eq!(snap.last, 0.0);
    assert_eq!(snap.avg, 0.0);

    assert_eq!(stats.total_scrapes.load(Ordering::Relaxed), 0);
    assert_eq!(stats.scrape_timeouts.load(Ordering::Relaxed), 0);
    assert_eq!(stats.encode_failures.load(Ordering::Relaxed), 0);
    assert_eq!(stats.get_last_scrape_time_str(), "N/A");
    assert_eq!(stats.get_scrape_success_rate(), 100.0);
}

#[test]
fn test_record_scrape_tracks_outcomes() {
    let stats = HealthStats::new();

    stats.record_scrape(0.010, 120, false);
    stats.record_scrape(0.030, 1, true);

    assert_eq!(stats.total_scrapes.load(Ordering::Relaxed), 2);
    assert_eq!(stats.scrape_success_count.load(Ordering::Relaxed), 1);
    assert_eq!(stats.scrape_aborted_count.load(Ordering::Relaxed), 1);

    let duration = stats.scrape_duration_seconds.snapshot();
    assert_eq!(duration.count, 2);
    assert_eq!(duration.last, 0.030);
    assert_eq!(duration.min, 0.010);
    assert_eq!(duration.max, 0.030);
    assert!((duration.avg - 0.020).abs() < 1e-9);

    let samples = stats.samples_per_scrape.snapshot();
    assert_eq!(samples.max, 120.0);
    assert_eq!(samples.min, 1.0);

    assert_ne!(stats.get_last_scrape_time_str(), "N/A");
}

#[test]
fn test_success_rate_counts_timeouts_as_failures() {
    let stats = HealthStats::new();

    stats.record_scrape(0.01, 10, false);
    stats.record_scrape(0.01, 10, false);
    stats.record_scrape(0.01, 1, true);
    stats.record_scrape_timeout();

    assert_eq!(stats.get_scrape_success_rate(), 50.0);
}

#[test]
fn test_record_encode() {
    let stats = HealthStats::new();

    stats.record_encode(1.5, 2048);
    stats.record_encode_failure();

    let size = stats.response_size_kb.snapshot();
    assert_eq!(size.last, 2.0);
    assert_eq!(stats.encode_duration_ms.snapshot().last, 1.5);
    assert_eq!(stats.encode_failures.load(Ordering::Relaxed), 1);
}

#[test]
fn test_http_request_window() {
    let stats = HealthStats::new();

    for _ in 0..5 {
        stats.record_http_request();
    }
    stats.record_metrics_endpoint_call();

    assert_eq!(stats.http_request_timestamps.count_last_minute(), 5);
    assert_eq!(stats.metrics_endpoint_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_render_table_contains_sections() {
    let stats = HealthStats::new();
    stats.record_scrape(0.004, 42, false);
    stats.record_scrape_timeout();
    stats.record_encode(0.3, 4096);

    let output = stats.render_table();

    assert!(output.contains("HEALTH ENDPOINT - EXPORTER INTERNAL STATS"));
    assert!(output.contains("SCRAPE PERFORMANCE"));
    assert!(output.contains("SCRAPE OUTCOMES"));
    assert!(output.contains("HTTP SERVER"));

    assert!(output.contains("scrape_duration (s)"));
    assert!(output.contains("samples_per_scrape"));
    assert!(output.contains("scrape_timeouts"));
    assert!(output.contains("number of done scrapes: 1"));
}

#[test]
fn test_render_table_na_columns() {
    let stats = HealthStats::new();
    stats.record_scrape_timeout();

    let output = stats.render_table();
    let line = output
        .lines()
        .find(|l| l.starts_with("scrape_timeouts"))
        .expect("scrape_timeouts row");
    assert!(line.contains(" 1 "), "row: {line}");
    assert_eq!(line.matches("N/A").count(), 3, "row: {line}");
}

#[test]
fn test_concurrent_recording() {
    let stats = Arc::new(HealthStats::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_scrape(0.001, i, i % 2 == 0);
                    stats.record_http_request();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(stats.total_scrapes.load(Ordering::Relaxed), 800);
    assert_eq!(stats.scrape_aborted_count.load(Ordering::Relaxed), 400);
    assert_eq!(stats.scrape_duration_seconds.snapshot().count, 800);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 800);
}
