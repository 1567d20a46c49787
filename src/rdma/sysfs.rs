//! Sysfs-backed device provider.
//!
//! Layout read per device:
//! - <root>/class/infiniband/<device>/ports/<n>/counters/*
//! - <root>/class/infiniband/<device>/ports/<n>/hw_counters/*
//! - <root>/class/infiniband/<device>/ports/<n>/{link_layer,state,phys_state,link_width,rate}
//! - <root>/class/infiniband/<device>/ports/<n>/gid_attrs/ndevs/*

use ahash::AHashSet as HashSet;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{Device, DeviceProvider, Port, PortAttributes};
use crate::error::ProviderError;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

const CLASS_INFINIBAND_PATH: &str = "class/infiniband";
const PORTS_DIR: &str = "ports";
const COUNTERS_DIR: &str = "counters";
const HW_COUNTERS_DIR: &str = "hw_counters";
const GID_ATTRS_DIR: &str = "gid_attrs";
const NDEVS_DIR: &str = "ndevs";

/// `enum ib_port_state`
const PORT_STATE_NAMES: &[(u32, &str)] = &[
    (0, "NOP"),
    (1, "DOWN"),
    (2, "INIT"),
    (3, "ARMED"),
    (4, "ACTIVE"),
    (5, "ACTIVE_DEFER"),
];

/// `enum ib_port_phys_state`
const PORT_PHYS_STATE_NAMES: &[(u32, &str)] = &[
    (1, "SLEEP"),
    (2, "POLLING"),
    (3, "DISABLED"),
    (4, "PORT_CONFIGURATION_TRAINING"),
    (5, "LINK_UP"),
    (6, "LINK_ERROR_RECOVERY"),
    (7, "PHY_TEST"),
];

#[derive(Debug)]
struct SysfsSettings {
    root: PathBuf,
    exclude_devices: HashSet<String>,
}

/// Reads RDMA devices from the node's sysfs.
#[derive(Debug)]
pub struct SysfsProvider {
    settings: RwLock<SysfsSettings>,
}

impl Default for SysfsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsProvider {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(SysfsSettings {
                root: PathBuf::from(DEFAULT_SYSFS_ROOT),
                exclude_devices: HashSet::new(),
            }),
        }
    }

    /// Overrides the sysfs root. An empty path restores the default.
    pub fn set_sysfs_root(&self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        settings.root = if root.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_SYSFS_ROOT)
        } else {
            root.to_path_buf()
        };
    }

    pub fn sysfs_root(&self) -> PathBuf {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .root
            .clone()
    }

    /// Devices listed here are skipped entirely.
    pub fn set_exclude_devices<I, S>(&self, devices: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        settings.exclude_devices = devices.into_iter().map(Into::into).collect();
    }

    pub fn is_excluded(&self, device: &str) -> bool {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .exclude_devices
            .contains(device)
    }

    fn devices_from_root(
        &self,
        cancel: &CancellationToken,
        root: &Path,
    ) -> Result<Vec<Device>, ProviderError> {
        let class_dir = root.join(CLASS_INFINIBAND_PATH);
        let names = match list_dir_names(&class_dir, EntryKind::Dir) {
            Ok(names) => names,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProviderError::io(class_dir, e)),
        };

        let mut devices = Vec::with_capacity(names.len());
        for name in names {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            if self.is_excluded(&name) {
                trace!(device = %name, "Skipping excluded device");
                continue;
            }

            let ports =
                ports_from_root(cancel, &class_dir.join(&name)).map_err(|e| {
                    ProviderError::Device {
                        device: name.clone(),
                        source: Box::new(e),
                    }
                })?;
            devices.push(Device { name, ports });
        }

        Ok(devices)
    }
}

impl DeviceProvider for SysfsProvider {
    fn devices(&self, cancel: &CancellationToken) -> Result<Vec<Device>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let root = self.sysfs_root();
        self.devices_from_root(cancel, &root)
    }
}

fn ports_from_root(cancel: &CancellationToken, device_dir: &Path) -> Result<Vec<Port>, ProviderError> {
    let ports_dir = device_dir.join(PORTS_DIR);
    let names = match list_dir_names(&ports_dir, EntryKind::Dir) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ProviderError::io(ports_dir, e)),
    };

    let mut ids: Vec<u32> = names.iter().filter_map(|n| n.parse().ok()).collect();
    ids.sort_unstable();

    let mut ports = Vec::with_capacity(ids.len());
    for id in ids {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let port_dir = ports_dir.join(id.to_string());
        let stats = read_counter_dir(&port_dir.join(COUNTERS_DIR), true)?;
        let hw_stats = read_counter_dir(&port_dir.join(HW_COUNTERS_DIR), false)?;

        ports.push(Port {
            id,
            stats,
            hw_stats,
            attributes: read_port_attributes(&port_dir),
        });
    }

    Ok(ports)
}

/// Reads every regular file in `dir` as a base-10 counter. A missing
/// directory fails the read when `required`, otherwise yields an empty map.
/// An unparsable value always fails the read.
fn read_counter_dir(dir: &Path, required: bool) -> Result<BTreeMap<String, u64>, ProviderError> {
    let names = match list_dir_names(dir, EntryKind::File) {
        Ok(names) => names,
        Err(e) if !required && e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(ProviderError::io(dir, e)),
    };

    let mut counters = BTreeMap::new();
    for name in names {
        let path = dir.join(&name);
        let raw = fs::read_to_string(&path).map_err(|e| ProviderError::io(&path, e))?;
        let value = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ProviderError::ParseCounter {
                name: name.clone(),
                value: raw.trim().to_string(),
            })?;
        counters.insert(name, value);
    }
    Ok(counters)
}

fn read_port_attributes(port_dir: &Path) -> PortAttributes {
    PortAttributes {
        link_layer: read_attr(port_dir, "link_layer"),
        state: normalize_port_state(&read_attr_raw(port_dir, "state"), PORT_STATE_NAMES),
        phys_state: normalize_port_state(
            &read_attr_raw(port_dir, "phys_state"),
            PORT_PHYS_STATE_NAMES,
        ),
        link_width: read_attr(port_dir, "link_width"),
        link_speed: read_attr(port_dir, "rate"),
        netdev: read_port_netdev(port_dir),
    }
}

fn read_attr_raw(port_dir: &Path, name: &str) -> String {
    fs::read_to_string(port_dir.join(name))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Like [`read_attr_raw`] but drops a parenthesized suffix, so
/// `"100 Gb/sec (4X EDR)"` becomes `"100 Gb/sec"`.
fn read_attr(port_dir: &Path, name: &str) -> String {
    let value = read_attr_raw(port_dir, name);
    match value.find('(') {
        Some(idx) if idx > 0 => value[..idx].trim().to_string(),
        _ => value,
    }
}

/// First non-empty file under `gid_attrs/ndevs`.
fn read_port_netdev(port_dir: &Path) -> String {
    let ndevs_dir = port_dir.join(GID_ATTRS_DIR).join(NDEVS_DIR);
    let Ok(names) = list_dir_names(&ndevs_dir, EntryKind::File) else {
        return String::new();
    };

    names
        .iter()
        .filter_map(|name| fs::read_to_string(ndevs_dir.join(name)).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Maps a sysfs state string such as `"4: ACTIVE"` to its canonical label.
///
/// The leading number wins; otherwise the text after `:` (or the whole
/// value) is matched ignoring case and punctuation. Unknown values are
/// returned as-is.
pub fn normalize_port_state(value: &str, names: &[(u32, &'static str)]) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }

    if let Some(number) = first_number(value) {
        if let Some((_, label)) = names.iter().find(|(n, _)| *n == number) {
            return (*label).to_string();
        }
    }

    if let Some(idx) = value.find(':') {
        if let Some(label) = canonical_from_label(&value[idx + 1..], names) {
            return label.to_string();
        }
    }

    canonical_from_label(value, names)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

pub fn normalize_state(value: &str) -> String {
    normalize_port_state(value, PORT_STATE_NAMES)
}

pub fn normalize_phys_state(value: &str) -> String {
    normalize_port_state(value, PORT_PHYS_STATE_NAMES)
}

fn canonical_from_label(label: &str, names: &[(u32, &'static str)]) -> Option<&'static str> {
    let key = label_key(label);
    if key.is_empty() {
        return None;
    }
    names
        .iter()
        .map(|(_, name)| *name)
        .find(|name| label_key(name) == key)
}

fn label_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

fn first_number(value: &str) -> Option<u32> {
    let start = value.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = &value[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

#[derive(Clone, Copy)]
enum EntryKind {
    Dir,
    File,
}

/// Sorted entry names of `dir` matching `kind`. Symlinks are followed, so
/// `class/infiniband/<dev>` links into `/sys/devices` count as directories.
fn list_dir_names(dir: &Path, kind: EntryKind) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(meta) = fs::metadata(entry.path()) else {
            continue;
        };
        let matches = match kind {
            EntryKind::Dir => meta.is_dir(),
            EntryKind::File => meta.is_file(),
        };
        if matches {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_state_from_number_prefix() {
        assert_eq!(normalize_state("4: ACTIVE"), "ACTIVE");
        assert_eq!(normalize_state("1: DOWN"), "DOWN");
        assert_eq!(normalize_phys_state("5: LinkUp"), "LINK_UP");
        assert_eq!(normalize_phys_state("3: Disabled"), "DISABLED");
    }

    #[test]
    fn test_normalize_state_from_label_only() {
        assert_eq!(normalize_state("active"), "ACTIVE");
        assert_eq!(normalize_phys_state("Link Up"), "LINK_UP");
        assert_eq!(normalize_phys_state("x: port configuration training"), "PORT_CONFIGURATION_TRAINING");
    }

    #[test]
    fn test_normalize_state_unknown_passthrough() {
        assert_eq!(normalize_state(""), "");
        assert_eq!(normalize_state("  "), "");
        assert_eq!(normalize_state("9: WEIRD"), "9: WEIRD");
        assert_eq!(normalize_phys_state("something"), "something");
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("4: ACTIVE"), Some(4));
        assert_eq!(first_number("state 12 x"), Some(12));
        assert_eq!(first_number("none"), None);
    }

    #[test]
    fn test_set_sysfs_root_empty_restores_default() {
        let provider = SysfsProvider::new();
        provider.set_sysfs_root("/tmp/fake");
        assert_eq!(provider.sysfs_root(), PathBuf::from("/tmp/fake"));
        provider.set_sysfs_root("");
        assert_eq!(provider.sysfs_root(), PathBuf::from(DEFAULT_SYSFS_ROOT));
    }

    #[test]
    fn test_set_exclude_devices() {
        let provider = SysfsProvider::new();
        provider.set_exclude_devices(["mlx5_1", "mlx5_3"]);

        assert!(!provider.is_excluded("mlx5_0"));
        assert!(provider.is_excluded("mlx5_1"));
        assert!(provider.is_excluded("mlx5_3"));

        provider.set_exclude_devices(Vec::<String>::new());
        assert!(!provider.is_excluded("mlx5_1"));
    }

    #[test]
    fn test_missing_class_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SysfsProvider::new();
        provider.set_sysfs_root(dir.path());

        let devices = provider.devices(&CancellationToken::new()).unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_cancelled_token_short_circuits() {
        let provider = SysfsProvider::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.devices(&cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
