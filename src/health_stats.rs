//! Health statistics for the exporter itself.
//!
//! Tracks scrape performance, scrape outcomes and HTTP request rates so the
//! health endpoint can render a small status table.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant, SystemTime};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Point-in-time copy of a [`Stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSnapshot {
    pub last: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        match self.inner.lock() {
            Ok(s) => StatSnapshot {
                last: s.last,
                avg: s.avg(),
                max: s.max,
                min: s.min,
                count: s.count,
            },
            Err(_) => StatSnapshot::default(),
        }
    }
}

/// Thread-safe window of recent HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(256)),
        }
    }
}

impl RequestTimestamps {
    /// Keeps ten minutes of history.
    const RETENTION: Duration = Duration::from_secs(600);

    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            while guard
                .front()
                .is_some_and(|&t| now.duration_since(t) > Self::RETENTION)
            {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let now = Instant::now();
            guard
                .iter()
                .filter(|&&t| now.duration_since(t) <= Duration::from_secs(60))
                .count() as u64
        } else {
            0
        }
    }
}

/// Exporter self-statistics.
pub struct HealthStats {
    // Scrape performance
    pub scrape_duration_seconds: Stat,
    pub samples_per_scrape: Stat,
    pub encode_duration_ms: Stat,
    pub response_size_kb: Stat,

    // Scrape outcomes
    pub total_scrapes: AtomicU64,
    pub scrape_success_count: AtomicU64,
    pub scrape_aborted_count: AtomicU64,
    pub scrape_timeouts: AtomicU64,
    pub encode_failures: AtomicU64,

    // HTTP server
    pub http_request_timestamps: RequestTimestamps,
    pub metrics_endpoint_calls: AtomicU64,

    // Timing
    pub start_time: Instant,
    pub last_scrape_time: StdRwLock<Option<Instant>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            scrape_duration_seconds: Stat::default(),
            samples_per_scrape: Stat::default(),
            encode_duration_ms: Stat::default(),
            response_size_kb: Stat::default(),
            total_scrapes: AtomicU64::new(0),
            scrape_success_count: AtomicU64::new(0),
            scrape_aborted_count: AtomicU64::new(0),
            scrape_timeouts: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_scrape_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a finished collection pass. `aborted` is true when the
    /// device provider failed and no port series were produced.
    pub fn record_scrape(&self, duration_seconds: f64, samples: usize, aborted: bool) {
        self.scrape_duration_seconds.add_sample(duration_seconds);
        self.samples_per_scrape.add_sample(samples as f64);
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        if aborted {
            self.scrape_aborted_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scrape_success_count.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut guard) = self.last_scrape_time.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_scrape_timeout(&self) {
        self.scrape_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode(&self, duration_ms: f64, size_bytes: usize) {
        self.encode_duration_ms.add_sample(duration_ms);
        self.response_size_kb.add_sample(size_bytes as f64 / 1024.0);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_scrape_success_rate(&self) -> f64 {
        let success = self.scrape_success_count.load(Ordering::Relaxed);
        let total = success
            + self.scrape_aborted_count.load(Ordering::Relaxed)
            + self.scrape_timeouts.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Wall-clock time (UTC, HH:MM:SS) of the last finished scrape.
    pub fn get_last_scrape_time_str(&self) -> String {
        const SECS_PER_DAY: u64 = 86400;
        const SECS_PER_HOUR: u64 = 3600;
        const SECS_PER_MINUTE: u64 = 60;

        let Ok(guard) = self.last_scrape_time.read() else {
            return "N/A".to_string();
        };
        let Some(last) = *guard else {
            return "N/A".to_string();
        };
        let Ok(now) = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) else {
            return "N/A".to_string();
        };

        let secs = now.as_secs().saturating_sub(last.elapsed().as_secs());
        format!(
            "{:02}:{:02}:{:02}",
            (secs % SECS_PER_DAY) / SECS_PER_HOUR,
            (secs % SECS_PER_HOUR) / SECS_PER_MINUTE,
            secs % SECS_PER_MINUTE
        )
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();
        table_row(&mut out, "", ["current", "average", "max", "min"].map(String::from));

        section(&mut out, "SCRAPE PERFORMANCE");
        stat_row(&mut out, "scrape_duration (s)", &self.scrape_duration_seconds, 3);
        stat_row(&mut out, "samples_per_scrape", &self.samples_per_scrape, 0);
        stat_row(&mut out, "encode_duration (ms)", &self.encode_duration_ms, 1);
        stat_row(&mut out, "response_size (KB)", &self.response_size_kb, 1);
        let rate = format!("{:.1}", self.get_scrape_success_rate());
        table_row(
            &mut out,
            "scrape_success_rate (%)",
            [rate.clone(), rate.clone(), rate.clone(), rate],
        );

        section(&mut out, "SCRAPE OUTCOMES");
        counter_row(&mut out, "scrapes_total", &self.total_scrapes);
        counter_row(&mut out, "scrapes_aborted", &self.scrape_aborted_count);
        counter_row(&mut out, "scrape_timeouts", &self.scrape_timeouts);
        counter_row(&mut out, "encode_failures", &self.encode_failures);

        section(&mut out, "HTTP SERVER");
        table_row(
            &mut out,
            "http_requests_last_minute",
            na_row(self.http_request_timestamps.count_last_minute().to_string()),
        );
        counter_row(&mut out, "metrics_endpoint_calls", &self.metrics_endpoint_calls);

        writeln!(out).ok();
        writeln!(
            out,
            "number of done scrapes: {} | last scrape: {} | uptime: {:.1}h",
            self.total_scrapes.load(Ordering::Relaxed),
            self.get_last_scrape_time_str(),
            self.get_uptime_hours()
        )
        .ok();

        out
    }
}

const LEFT_COL: usize = 26;
const COL_W: usize = 12;

fn section(out: &mut String, title: &str) {
    writeln!(out).ok();
    writeln!(out, "{title}").ok();
    writeln!(out, "{}", "-".repeat(title.len() + 1)).ok();
}

fn table_row(out: &mut String, name: &str, cols: [String; 4]) {
    let [cur, avg, max, min] = cols;
    writeln!(
        out,
        "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
        name,
        cur,
        avg,
        max,
        min,
        left = LEFT_COL,
        col = COL_W
    )
    .ok();
}

fn stat_row(out: &mut String, name: &str, stat: &Stat, precision: usize) {
    let s = stat.snapshot();
    table_row(
        out,
        name,
        [s.last, s.avg, s.max, s.min].map(|v| format!("{v:.precision$}")),
    );
}

fn counter_row(out: &mut String, name: &str, counter: &AtomicU64) {
    table_row(out, name, na_row(counter.load(Ordering::Relaxed).to_string()));
}

fn na_row(current: String) -> [String; 4] {
    [current, "N/A".into(), "N/A".into(), "N/A".into()]
}
