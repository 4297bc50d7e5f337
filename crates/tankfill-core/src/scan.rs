//! Device discovery.
//!
//! Scans for advertising sensors and turns them into [`Candidate`]s for a
//! [`DevicePicker`](crate::traits::DevicePicker).

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{Candidate, DeviceFilter};

/// A device found by a scan, with the handle needed to connect it.
#[derive(Debug, Clone)]
pub struct Discovered {
    /// What the picker sees.
    pub candidate: Candidate,
    /// The btleplug handle.
    pub peripheral: Peripheral,
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::connection_failed(
        None,
        ConnectionFailureReason::AdapterUnavailable,
    ))
}

/// Scan for `duration` and return devices passing `filter`, strongest first.
///
/// An empty list means nothing matched; it is not an error.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    filter: &DeviceFilter,
    duration: Duration,
) -> Result<Vec<Discovered>> {
    info!(
        "Scanning for {:?} devices for {} seconds...",
        filter.name_prefix.as_deref().unwrap_or("any"),
        duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(duration).await;
    adapter.stop_scan().await?;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(e) => {
                debug!("Error reading peripheral properties: {}", e);
                continue;
            }
        };
        let name = properties.local_name.clone();
        if !filter.matches_name(name.as_deref()) {
            continue;
        }
        let candidate = Candidate {
            id: create_identifier(&properties.address.to_string(), &peripheral.id()),
            name,
            rssi: properties.rssi,
        };
        debug!("Found candidate {}", candidate);
        found.push(Discovered {
            candidate,
            peripheral,
        });
    }

    found.sort_by_key(|d| std::cmp::Reverse(d.candidate.rssi.unwrap_or(i16::MIN)));
    info!("Scan complete. Found {} matching device(s)", found.len());
    Ok(found)
}

/// Format a peripheral ID without the `PeripheralId(..)` wrapper.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Identifier for a device: its address, or the peripheral ID where the
/// platform hides addresses (macOS reports all zeros).
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_hidden_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn is_hidden_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}
