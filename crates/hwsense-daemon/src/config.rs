//! Configuration management.

use anyhow::{Context, Result};
use hwsense_hw::DeviceSelection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::interval::PollInterval;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Polling behaviour
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Device categories to enumerate
    #[serde(default)]
    pub devices: DeviceSelection,

    /// Backend filesystem roots
    #[serde(default)]
    pub backend: BackendConfig,

    /// D-Bus configuration
    #[serde(default)]
    pub dbus: DbusConfig,

    /// Event history
    #[serde(default)]
    pub events: EventsConfig,
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll interval preset (fast, normal, eco, slow)
    #[serde(default)]
    pub interval: PollInterval,

    /// Start monitoring when the daemon starts
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Longest a single collection may run before monitoring is halted,
    /// in milliseconds (0 disables)
    #[serde(default = "default_collection_timeout")]
    pub collection_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: PollInterval::default(),
            autostart: default_autostart(),
            collection_timeout_ms: default_collection_timeout(),
        }
    }
}

impl MonitorConfig {
    /// Collection timeout, or `None` when disabled.
    pub fn collection_timeout(&self) -> Option<Duration> {
        (self.collection_timeout_ms > 0).then(|| Duration::from_millis(self.collection_timeout_ms))
    }
}

/// Where the hwmon backend looks for sysfs and procfs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    #[serde(default = "default_procfs_root")]
    pub procfs_root: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            procfs_root: default_procfs_root(),
        }
    }
}

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbusBusType {
    /// Try the session bus first, fall back to the system bus
    #[default]
    Auto,
    Session,
    System,
}

/// D-Bus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbusConfig {
    /// Bus to register on (auto, session, system)
    #[serde(default)]
    pub bus: DbusBusType,
}

/// Event history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Number of recent events kept for `RecentEvents`
    #[serde(default = "default_history")]
    pub history: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history: default_history(),
        }
    }
}

// Default value functions
fn default_autostart() -> bool {
    true
}

fn default_collection_timeout() -> u64 {
    30_000
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(hwsense_hw::hwmon::DEFAULT_SYSFS_ROOT)
}

fn default_procfs_root() -> PathBuf {
    PathBuf::from(hwsense_hw::hwmon::DEFAULT_PROCFS_ROOT)
}

fn default_history() -> usize {
    256
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }
}
