//! Check command implementation.
//!
//! Reads the sysfs tree once and prints what a scrape would see.

use rdma_exporter::{DeviceProvider, SysfsProvider};
use tokio_util::sync::CancellationToken;

use crate::config::{validate_effective_config, Config};

/// Lists devices, ports and optionally every counter.
pub fn command_check(counters: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 RDMA Exporter - System Check");
    println!("===============================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    let sysfs = SysfsProvider::new();
    sysfs.set_sysfs_root(config.sysfs_root());
    sysfs.set_exclude_devices(config.exclude_devices().iter().map(String::as_str));

    println!(
        "\n📁 Reading {}/class/infiniband...",
        sysfs.sysfs_root().display()
    );
    match sysfs.devices(&CancellationToken::new()) {
        Ok(devices) if devices.is_empty() => {
            println!("   ⚠️  No RDMA devices found");
        }
        Ok(devices) => {
            println!("   ✅ {} device(s)", devices.len());
            for device in &devices {
                println!("   ├─ {}", device.name);
                for port in &device.ports {
                    let attrs = &port.attributes;
                    println!(
                        "   │  ├─ port {}: {} {} ({}) {} {}",
                        port.id,
                        attrs.link_layer,
                        attrs.state,
                        attrs.phys_state,
                        attrs.link_width,
                        attrs.link_speed
                    );
                    if !attrs.netdev.is_empty() {
                        println!("   │  │  ├─ netdev: {}", attrs.netdev);
                    }
                    println!(
                        "   │  │  └─ {} counters, {} hw counters",
                        port.stats.len(),
                        port.hw_stats.len()
                    );
                    if counters {
                        for (name, value) in port.stats.iter().chain(port.hw_stats.iter()) {
                            println!("   │  │     {} = {}", name, value);
                        }
                    }
                }
            }
        }
        Err(e) => {
            println!("   ❌ Failed to read devices: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
