//! Startup requirement validation for rdma-exporter.
//!
//! Checks that the RDMA sysfs tree is readable and, when RoCE PFC metrics
//! are requested, that an ethtool control socket can be opened.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use rdma_exporter::EthtoolStatsProvider;

/// Validate all runtime requirements
pub fn validate_requirements(sysfs_root: &Path, require_pfc: bool) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_infiniband_class(sysfs_root)?;

    if require_pfc {
        check_ethtool_socket()?;
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

fn check_user_privileges() {
    if geteuid().is_root() {
        info!("✅ Running as root (uid=0)");
    } else {
        // sysfs counters are world readable; ethtool stats usually are too
        debug!("Not running as root");
    }
}

/// Check that `<root>/class/infiniband` exists and lists at least one device.
fn check_infiniband_class(sysfs_root: &Path) -> Result<(), ValidationError> {
    let class_dir = sysfs_root.join("class").join("infiniband");

    match fs::read_dir(&class_dir) {
        Ok(entries) => {
            let count = entries.filter_map(Result::ok).count();
            if count == 0 {
                warn!("⚠️  {} is empty - no RDMA devices present", class_dir.display());
                warn!("   The exporter will serve only its own error counters");
            } else {
                info!("✅ {} RDMA device(s) under {}", count, class_dir.display());
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("⚠️  {} not found - is the ib_core module loaded?", class_dir.display());
            warn!("   Solution: modprobe ib_core (or the driver for your adapter)");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", class_dir.display());
            Err(ValidationError::InsufficientPermissions(format!(
                "{}: {}",
                class_dir.display(),
                e
            )))
        }
        Err(e) => Err(ValidationError::SysfsUnreadable(format!(
            "{}: {}",
            class_dir.display(),
            e
        ))),
    }
}

fn check_ethtool_socket() -> Result<(), ValidationError> {
    debug!("Checking ethtool requirements...");

    match EthtoolStatsProvider::new() {
        Ok(provider) => {
            provider.close();
            info!("✅ ethtool control socket available");
            Ok(())
        }
        Err(e) => {
            error!("❌ Cannot open ethtool control socket: {}", e);
            error!("   RoCE PFC metrics will be disabled");
            Err(ValidationError::EthtoolUnavailable(e.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("sysfs not readable: {0}")]
    SysfsUnreadable(String),

    #[error("ethtool unavailable: {0}")]
    EthtoolUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_class_dir_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_requirements(dir.path(), false).is_ok());
    }

    #[test]
    fn populated_class_dir_passes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("class/infiniband/mlx5_0")).unwrap();
        assert!(check_infiniband_class(dir.path()).is_ok());
    }
}
