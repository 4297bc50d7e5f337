//! Doctor command implementation.
//!
//! Checks Bluetooth support, the sensor configuration and the history
//! database, and explains what to fix.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use tankfill_core::PlatformInfo;
use tankfill_store::Store;

use crate::config::Config;
use crate::format::format_timestamp;

/// Check result with status and message.
struct Check {
    name: &'static str,
    passed: bool,
    warning: bool,
    message: String,
}

impl Check {
    fn pass(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            warning: false,
            message: message.into(),
        }
    }

    fn warn(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            warning: true,
            message: message.into(),
        }
    }

    fn fail(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            warning: false,
            message: message.into(),
        }
    }
}

pub async fn cmd_doctor(config: &Config, config_path: &Path, db: &Path, verbose: bool, no_color: bool) -> Result<()> {
    println!("{}", title("Tankfill Doctor", no_color));
    println!();

    let info = PlatformInfo::detect().await;
    let mut checks = vec![
        check_bluetooth(&info),
        check_geometry(config),
        check_gatt(config),
        check_storage(db),
    ];
    if verbose {
        checks.insert(
            0,
            Check::pass(
                "Platform",
                format!("{} ({}, {})", info.platform, info.arch, info.ble_stack),
            ),
        );
        checks.push(Check::pass(
            "Config File",
            if config_path.exists() {
                config_path.display().to_string()
            } else {
                format!("{} (not created, using defaults)", config_path.display())
            },
        ));
    }

    for check in &checks {
        print_check(check, no_color);
    }

    println!();
    println!("{}", "─".repeat(50));

    let passed = checks.iter().filter(|c| c.passed && !c.warning).count();
    let warnings = checks.iter().filter(|c| c.warning).count();
    let failed = checks.iter().filter(|c| !c.passed).count();
    if no_color {
        println!(
            "Summary: {} passed, {} warnings, {} failed",
            passed, warnings, failed
        );
    } else {
        println!(
            "Summary: {} passed, {} warnings, {} failed",
            passed.green(),
            warnings.yellow(),
            failed.red()
        );
    }

    if failed > 0 {
        println!();
        print_troubleshooting_help();
    }
    Ok(())
}

fn title(text: &str, no_color: bool) -> String {
    if no_color {
        format!("{}\n{}", text, "━".repeat(text.len()))
    } else {
        format!("{}\n{}", text.bold(), "━".repeat(text.len()).dimmed())
    }
}

fn print_check(check: &Check, no_color: bool) {
    let icon = match (check.passed, check.warning, no_color) {
        (true, false, true) => "[OK]".to_string(),
        (true, false, false) => format!("{}", "[OK]".green()),
        (true, true, true) => "[!!]".to_string(),
        (true, true, false) => format!("{}", "[!!]".yellow()),
        (false, _, true) => "[FAIL]".to_string(),
        (false, _, false) => format!("{}", "[FAIL]".red()),
    };
    println!("{} {:<14} {}", icon, check.name, check.message);
}

fn check_bluetooth(info: &PlatformInfo) -> Check {
    if info.capabilities.bluetooth {
        Check::pass("Bluetooth", format!("Adapter available via {}", info.ble_stack))
    } else {
        Check::fail("Bluetooth", "No usable Bluetooth adapter found")
    }
}

fn check_geometry(config: &Config) -> Check {
    let geometry = config.tank.geometry();
    match geometry.validate() {
        Ok(()) => Check::pass("Tank", geometry.to_string()),
        Err(e) => Check::fail("Tank", format!("Invalid geometry: {}", e)),
    }
}

fn check_gatt(config: &Config) -> Check {
    let session = config.session_config();
    if let Err(e) = session.validate() {
        return Check::fail("Sensor", e.to_string());
    }
    match session.data_characteristic() {
        Some(id) => Check::pass("Sensor", format!("'{}*' reading {}", session.device_name_prefix, id)),
        None => {
            let mut message = "GATT identifiers are not set; connections will carry no data".to_string();
            for warning in session.warnings() {
                message.push_str("\n                    ");
                message.push_str(&warning);
            }
            Check::warn("Sensor", message)
        }
    }
}

fn check_storage(db: &Path) -> Check {
    if !db.exists() {
        return Check::pass(
            "Storage",
            format!("{} (created on first use)", db.display()),
        );
    }
    match Store::open(db).and_then(|store| store.stats()) {
        Ok(stats) => {
            let span = match (stats.oldest_ts, stats.newest_ts) {
                (Some(oldest), Some(newest)) => format!(
                    ", {} .. {}",
                    format_timestamp(oldest),
                    format_timestamp(newest)
                ),
                _ => String::new(),
            };
            Check::pass(
                "Storage",
                format!("{} ({} readings{})", db.display(), stats.count, span),
            )
        }
        Err(e) => Check::warn(
            "Storage",
            format!("{} unavailable ({}); readings will not persist", db.display(), e),
        ),
    }
}

fn print_troubleshooting_help() {
    println!("Troubleshooting Tips:");

    #[cfg(target_os = "macos")]
    {
        println!("  • Ensure Bluetooth is enabled in System Settings");
        println!("  • Grant Bluetooth permission to your terminal");
    }

    #[cfg(target_os = "linux")]
    {
        println!("  • Ensure BlueZ is installed and running: systemctl status bluetooth");
        println!("  • Add your user to the bluetooth group: sudo usermod -aG bluetooth $USER");
    }

    #[cfg(target_os = "windows")]
    {
        println!("  • Ensure Bluetooth is enabled in Settings");
        println!("  • Check Device Manager for a Bluetooth adapter");
    }

    println!("  • Fix the tank calibration with `tankfill config init` and edit [tank]");
}
