//! Host capability detection.
//!
//! A [`SensorSession`](crate::session::SensorSession) asks a
//! [`CapabilityOracle`] whether Bluetooth is usable before it touches the
//! radio, so connecting on a host without an adapter fails fast with
//! [`Error::UnsupportedPlatform`](crate::Error::UnsupportedPlatform).
//!
//! | Platform | BLE Stack | Notes |
//! |----------|-----------|-------|
//! | macOS | CoreBluetooth | Devices are identified by UUID, not MAC |
//! | Linux | BlueZ | Requires a running `bluetoothd` |
//! | Windows | WinRT | |

use std::fmt;

use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Answers whether the host can talk to a BLE sensor.
pub trait CapabilityOracle: Send + Sync {
    /// Whether a Bluetooth stack and adapter are available.
    fn is_bluetooth_supported(&self) -> bool;

    /// Whether the host is iOS Safari, which never exposes Bluetooth to
    /// web content regardless of hardware.
    fn is_platform_ios_safari(&self) -> bool;
}

/// Fixed capability answers, either detected once or set for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Bluetooth is usable.
    pub bluetooth: bool,
    /// Host is iOS Safari.
    pub ios_safari: bool,
}

impl PlatformCapabilities {
    /// Capabilities of a host with a working adapter.
    pub const fn supported() -> Self {
        Self {
            bluetooth: true,
            ios_safari: false,
        }
    }

    /// Capabilities of a host without Bluetooth.
    pub const fn unsupported() -> Self {
        Self {
            bluetooth: false,
            ios_safari: false,
        }
    }
}

impl CapabilityOracle for PlatformCapabilities {
    fn is_bluetooth_supported(&self) -> bool {
        self.bluetooth
    }

    fn is_platform_ios_safari(&self) -> bool {
        self.ios_safari
    }
}

/// Probe the host for a usable Bluetooth adapter.
///
/// Never fails: any error from the BLE stack means "unsupported".
pub async fn detect_capabilities() -> PlatformCapabilities {
    let bluetooth = match Manager::new().await {
        Ok(manager) => match manager.adapters().await {
            Ok(adapters) => !adapters.is_empty(),
            Err(e) => {
                debug!("Listing Bluetooth adapters failed: {}", e);
                false
            }
        },
        Err(e) => {
            debug!("Bluetooth manager unavailable: {}", e);
            false
        }
    };
    PlatformCapabilities {
        bluetooth,
        ios_safari: false,
    }
}

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// macOS with CoreBluetooth
    MacOS,
    /// Linux with BlueZ
    Linux,
    /// Windows with WinRT
    Windows,
    /// Anything else
    Unknown,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }
        #[cfg(target_os = "linux")]
        {
            Platform::Linux
        }
        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            Platform::Unknown
        }
    }

    /// Name of the platform's BLE stack.
    pub fn ble_stack(&self) -> &'static str {
        match self {
            Platform::MacOS => "CoreBluetooth",
            Platform::Linux => "BlueZ",
            Platform::Windows => "WinRT",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::MacOS => "macOS",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
            Platform::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Summary of the host for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Operating system family.
    pub platform: Platform,
    /// BLE stack name.
    pub ble_stack: String,
    /// CPU architecture.
    pub arch: String,
    /// Detected capabilities.
    pub capabilities: PlatformCapabilities,
}

impl PlatformInfo {
    /// Describe the current host given detected capabilities.
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        let platform = Platform::current();
        Self {
            platform,
            ble_stack: platform.ble_stack().to_string(),
            arch: std::env::consts::ARCH.to_string(),
            capabilities,
        }
    }

    /// Detect capabilities and describe the current host.
    pub async fn detect() -> Self {
        Self::new(detect_capabilities().await)
    }
}
