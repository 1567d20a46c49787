//! RoCE priority flow control stat name parsing.
//!
//! Ethernet drivers expose per-priority pause counters through ethtool with
//! names like `rx_prio3_pause` or `tx_prio0_pause_duration`. Only those
//! names are turned into derived series; everything else is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

static PFC_STAT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(rx|tx)_prio([0-7])_pause(?:_(duration|transition))?$")
        .expect("PFC stat pattern is valid")
});

/// Which derived family a PFC stat feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfcKind {
    /// `..._pause`
    Frames,
    /// `..._pause_duration`
    Duration,
    /// `..._pause_transition`
    Transitions,
}

/// Decomposed PFC stat name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcStat {
    /// `rx` or `tx`.
    pub direction: String,
    /// Single decimal digit, 0 through 7.
    pub priority: String,
    pub kind: PfcKind,
}

/// Parses an ethtool stat name into its PFC components, or `None` when the
/// name is not a per-priority pause counter.
pub fn parse_pfc_stat_name(name: &str) -> Option<PfcStat> {
    let caps = PFC_STAT_PATTERN.captures(name)?;

    let kind = match caps.get(3).map(|m| m.as_str()) {
        None => PfcKind::Frames,
        Some("duration") => PfcKind::Duration,
        Some("transition") => PfcKind::Transitions,
        Some(_) => return None,
    };

    Some(PfcStat {
        direction: caps[1].to_string(),
        priority: caps[2].to_string(),
        kind,
    })
}
