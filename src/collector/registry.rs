//! Lazily populated registry of per-counter metric descriptors.
//!
//! Counter names are not known up front, so descriptors are allocated the
//! first time a raw name is seen and then kept for the lifetime of the
//! process. Once allocated, an identifier never changes meaning.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::sync::Arc;

use super::canonical::{canonical_doc_name, doc_help, sanitize_stat_name};
use crate::exposition::{MetricDescriptor, MetricKind};

/// Labels carried by every per-counter series.
pub const PORT_COUNTER_LABELS: &[&str] = &["device", "port"];

const METRIC_PREFIX: &str = "rdma";
const METRIC_SUFFIX: &str = "total";

/// Source directory of a counter. The two families keep separate raw-name
/// caches and never alias each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterFamily {
    /// `ports/<n>/counters`
    Port,
    /// `ports/<n>/hw_counters`
    Hw,
}

impl CounterFamily {
    fn fallback_help(self) -> &'static str {
        match self {
            CounterFamily::Port => "RDMA port counter sourced from sysfs counters.",
            CounterFamily::Hw => "RDMA port hardware counter sourced from sysfs hw_counters.",
        }
    }

    fn index(self) -> usize {
        match self {
            CounterFamily::Port => 0,
            CounterFamily::Hw => 1,
        }
    }
}

/// Allocated identifier together with the concept it stands for.
#[derive(Debug, Clone)]
struct MetricEntry {
    desc: Arc<MetricDescriptor>,
    family: CounterFamily,
    doc_name: String,
}

/// Process-lifetime descriptor cache.
///
/// Not internally synchronized: the collector keeps it behind the same
/// mutex that serializes collection.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    /// Identifier -> entry, shared across both families.
    entries: HashMap<String, MetricEntry>,
    /// Raw name -> identifier, one table per family.
    lookups: [HashMap<String, String>; 2],
    /// Identifiers owned by fixed metric families. No counter may take them.
    reserved: HashSet<String>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose counters never resolve to any of `names`.
    pub fn with_reserved<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Returns the descriptor for a raw counter name, allocating one on first
    /// sight. Never fails.
    pub fn descriptor_for(&mut self, stat: &str, family: CounterFamily) -> Arc<MetricDescriptor> {
        if let Some(entry) = self.lookups[family.index()]
            .get(stat)
            .and_then(|name| self.entries.get(name))
        {
            return Arc::clone(&entry.desc);
        }

        let doc_name = canonical_doc_name(stat);
        let metric_name = self.build_metric_name(&doc_name, family);

        let desc = match self.entries.get(&metric_name) {
            // Another raw alias of the same concept already allocated it.
            Some(existing) => Arc::clone(&existing.desc),
            None => {
                let desc = Arc::new(MetricDescriptor::new(
                    metric_name.clone(),
                    doc_help(&doc_name, family.fallback_help()),
                    MetricKind::Counter,
                    PORT_COUNTER_LABELS,
                ));
                self.entries.insert(
                    metric_name.clone(),
                    MetricEntry {
                        desc: Arc::clone(&desc),
                        family,
                        doc_name,
                    },
                );
                desc
            }
        };

        self.lookups[family.index()].insert(stat.to_string(), metric_name);
        desc
    }

    /// Picks the identifier for a documented name.
    ///
    /// The plain `rdma_<base>_total` form is used unless it is reserved or
    /// already belongs to a different concept, in which case the FNV-1a digest
    /// of the documented name is appended. The family-qualified digest is the last resort when
    /// the same documented name shows up in both families.
    fn build_metric_name(&self, doc_name: &str, family: CounterFamily) -> String {
        let base = sanitize_stat_name(doc_name);
        let candidates = [
            format!("{METRIC_PREFIX}_{base}_{METRIC_SUFFIX}"),
            format!(
                "{METRIC_PREFIX}_{base}_{:08x}_{METRIC_SUFFIX}",
                fnv32a(doc_name)
            ),
            format!(
                "{METRIC_PREFIX}_{base}_{:08x}_{METRIC_SUFFIX}",
                fnv32a(&format!("{family:?}/{doc_name}"))
            ),
        ];

        for candidate in &candidates {
            if self.reserved.contains(candidate) {
                continue;
            }
            match self.entries.get(candidate) {
                None => return candidate.clone(),
                Some(entry) if entry.family == family && entry.doc_name == doc_name => {
                    return candidate.clone()
                }
                Some(_) => continue,
            }
        }

        // Unreachable in practice: three distinct owners for one base name.
        candidates[2].clone()
    }

    /// Snapshot of all allocated descriptors, sorted by identifier.
    pub fn descriptors(&self) -> Vec<Arc<MetricDescriptor>> {
        let mut descs: Vec<Arc<MetricDescriptor>> =
            self.entries.values().map(|e| Arc::clone(&e.desc)).collect();
        descs.sort_by(|a, b| a.name.cmp(&b.name));
        descs
    }

    /// Number of allocated identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 32-bit FNV-1a.
fn fnv32a(s: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    s.bytes().fold(OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(PRIME)
    })
}
