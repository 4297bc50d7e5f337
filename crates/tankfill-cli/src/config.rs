//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tankfill_core::SessionConfig;
use tankfill_core::config::DEFAULT_DEBOUNCE_MS;
use tankfill_types::uuid::{DEFAULT_DEVICE_NAME_PREFIX, PLACEHOLDER_CHARACTERISTIC, PLACEHOLDER_SERVICE};
use tankfill_types::{PayloadLayout, TankGeometry};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sensor identity and decoding
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Tank calibration
    #[serde(default)]
    pub tank: TankConfig,

    /// History database
    #[serde(default)]
    pub storage: StorageConfig,

    /// Synthetic data generation
    #[serde(default)]
    pub demo: DemoConfig,
}

/// `[sensor]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Advertised name prefix
    pub name_prefix: String,
    /// GATT service UUID (`0x` short form or full lowercase UUID)
    pub service_uuid: String,
    /// GATT characteristic carrying the distance
    pub characteristic_uuid: String,
    /// Minimum milliseconds between accepted readings
    pub debounce_ms: u64,
    /// Exponential smoothing factor in (0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing_alpha: Option<f64>,
    /// Location of the distance inside a payload
    pub payload: PayloadLayout,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_DEVICE_NAME_PREFIX.to_string(),
            service_uuid: PLACEHOLDER_SERVICE.to_string(),
            characteristic_uuid: PLACEHOLDER_CHARACTERISTIC.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            smoothing_alpha: None,
            payload: PayloadLayout::default(),
        }
    }
}

/// `[tank]` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankConfig {
    /// Sensor-to-surface distance when full
    pub min_distance_mm: f64,
    /// Sensor-to-surface distance when empty
    pub max_distance_mm: f64,
}

impl Default for TankConfig {
    fn default() -> Self {
        let geometry = TankGeometry::default();
        Self {
            min_distance_mm: geometry.min_distance_mm,
            max_distance_mm: geometry.max_distance_mm,
        }
    }
}

impl TankConfig {
    pub fn geometry(&self) -> TankGeometry {
        TankGeometry::new(self.min_distance_mm, self.max_distance_mm)
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path (defaults to the platform data directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Days of history kept by `prune` when `--days` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

/// `[demo]` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Milliseconds between synthetic readings
    pub interval_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tankfill")
            .join("config.toml")
    }

    /// Load config from `path`, or return the default if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Session settings described by this file.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default()
            .gatt(
                self.sensor.service_uuid.clone(),
                self.sensor.characteristic_uuid.clone(),
            )
            .geometry(self.tank.geometry())
            .debounce_ms(self.sensor.debounce_ms)
            .payload(self.sensor.payload);
        config.device_name_prefix = self.sensor.name_prefix.clone();
        config.smoothing_alpha = self.sensor.smoothing_alpha;
        config
    }

    /// Database path: the override, then the configured path, then the default.
    pub fn db_path(&self, db_override: Option<&Path>) -> PathBuf {
        db_override
            .map(Path::to_path_buf)
            .or_else(|| self.storage.path.clone())
            .unwrap_or_else(tankfill_store::default_db_path)
    }
}
