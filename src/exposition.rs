//! Exposition sink for scrape output.
//!
//! The collector emits a flat list of [`Sample`]s, each carrying the
//! [`MetricDescriptor`] it belongs to. [`encode_text`] groups them into
//! metric families and renders the Prometheus text format with one
//! `# HELP`/`# TYPE` pair per identifier.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use prometheus::core::Collector;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::debug;

use crate::error::ExpositionError;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Prometheus metric type of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Descriptor published for metadata discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: &'static [&'static str],
}

impl MetricDescriptor {
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            label_names,
        }
    }
}

/// A single emitted value. `label_values` follow the order of
/// `desc.label_names`.
#[derive(Debug, Clone)]
pub struct Sample {
    pub desc: Arc<MetricDescriptor>,
    pub value: f64,
    pub label_values: Vec<String>,
}

impl Sample {
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// Returns the value of the named label, if the descriptor has it.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names
            .iter()
            .position(|l| *l == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
    }
}

/// Per-identifier series builder backed by a prometheus vec.
enum Family {
    Counter(CounterVec),
    Gauge(GaugeVec),
}

impl Family {
    fn new(desc: &MetricDescriptor) -> Result<Self, prometheus::Error> {
        let opts = Opts::new(desc.name.clone(), desc.help.clone());
        Ok(match desc.kind {
            MetricKind::Counter => Family::Counter(CounterVec::new(opts, desc.label_names)?),
            MetricKind::Gauge => Family::Gauge(GaugeVec::new(opts, desc.label_names)?),
        })
    }

    fn observe(&self, sample: &Sample) -> Result<(), prometheus::Error> {
        let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
        match self {
            // Counters are rebuilt every scrape, so inc_by sets the absolute value.
            Family::Counter(vec) => vec.get_metric_with_label_values(&values)?.inc_by(sample.value),
            Family::Gauge(vec) => vec.get_metric_with_label_values(&values)?.set(sample.value),
        }
        Ok(())
    }

    fn boxed(self) -> Box<dyn Collector> {
        match self {
            Family::Counter(vec) => Box::new(vec),
            Family::Gauge(vec) => Box::new(vec),
        }
    }
}

/// Groups samples by identifier into a fresh prometheus registry.
///
/// The registry sorts families by name and series by label values, so the
/// rendered output is stable for unchanged input. Two samples for the same
/// identifier and label values are rejected.
pub fn build_registry(samples: &[Sample]) -> Result<Registry, ExpositionError> {
    let mut families: HashMap<&str, Family> = HashMap::new();
    let mut seen: HashSet<(&str, &[String])> = HashSet::with_capacity(samples.len());

    for sample in samples {
        if !seen.insert((sample.name(), sample.label_values.as_slice())) {
            return Err(ExpositionError::DuplicateSeries {
                name: sample.name().to_string(),
                labels: sample.label_values.join(","),
            });
        }
        let family = match families.entry(sample.name()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Family::new(&sample.desc)?),
        };
        family.observe(sample)?;
    }

    let registry = Registry::new();
    for (_, family) in families {
        registry.register(family.boxed())?;
    }
    Ok(registry)
}

/// Renders samples in the Prometheus text exposition format.
pub fn encode_text(samples: &[Sample]) -> Result<String, ExpositionError> {
    let registry = build_registry(samples)?;
    let families = registry.gather();

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    TextEncoder::new().encode(&families, &mut buffer)?;

    debug!(
        "Encoded {} metric families ({} samples, {} bytes)",
        families.len(),
        samples.len(),
        buffer.len()
    );
    Ok(String::from_utf8(buffer)?)
}
