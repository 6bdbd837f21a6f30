//! Device and backend capability traits.
//!
//! A backend exposes a tree of devices. Each device can refresh its cached
//! values, report its sensors and hand out nested sub-devices. Callers only
//! ever work through these traits; they never look at concrete device types.

use crate::sensor::RawSensor;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Device category reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareType {
    Cpu,
    Gpu,
    Motherboard,
    /// Super-I/O monitoring chip, usually a motherboard sub-device.
    SuperIo,
    Memory,
    Storage,
    Network,
    Controller,
    Cooler,
    Psu,
    Battery,
}

impl FromStr for HardwareType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(HardwareType::Cpu),
            "gpu" => Ok(HardwareType::Gpu),
            "motherboard" => Ok(HardwareType::Motherboard),
            "superio" | "super-io" => Ok(HardwareType::SuperIo),
            "memory" => Ok(HardwareType::Memory),
            "storage" => Ok(HardwareType::Storage),
            "network" => Ok(HardwareType::Network),
            "controller" => Ok(HardwareType::Controller),
            "cooler" => Ok(HardwareType::Cooler),
            "psu" => Ok(HardwareType::Psu),
            "battery" => Ok(HardwareType::Battery),
            _ => Err(Error::InvalidHardwareType(s.to_string())),
        }
    }
}

impl std::fmt::Display for HardwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareType::Cpu => write!(f, "cpu"),
            HardwareType::Gpu => write!(f, "gpu"),
            HardwareType::Motherboard => write!(f, "motherboard"),
            HardwareType::SuperIo => write!(f, "superio"),
            HardwareType::Memory => write!(f, "memory"),
            HardwareType::Storage => write!(f, "storage"),
            HardwareType::Network => write!(f, "network"),
            HardwareType::Controller => write!(f, "controller"),
            HardwareType::Cooler => write!(f, "cooler"),
            HardwareType::Psu => write!(f, "psu"),
            HardwareType::Battery => write!(f, "battery"),
        }
    }
}

/// Which device categories a session may enumerate.
///
/// Memory, storage, network and controller backends are off by default: they
/// are the least stable and the most likely to report garbage or take the
/// host process down with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    pub cpu: bool,
    pub gpu: bool,
    pub motherboard: bool,
    pub memory: bool,
    pub storage: bool,
    pub network: bool,
    pub controller: bool,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self {
            cpu: true,
            gpu: true,
            motherboard: true,
            memory: false,
            storage: false,
            network: false,
            controller: false,
        }
    }
}

impl DeviceSelection {
    /// Returns true if devices of this type may be enumerated.
    pub fn allows(&self, hardware_type: HardwareType) -> bool {
        match hardware_type {
            HardwareType::Cpu => self.cpu,
            HardwareType::Gpu => self.gpu,
            HardwareType::Motherboard | HardwareType::SuperIo => self.motherboard,
            HardwareType::Memory => self.memory,
            HardwareType::Storage => self.storage,
            HardwareType::Network => self.network,
            HardwareType::Controller
            | HardwareType::Cooler
            | HardwareType::Psu
            | HardwareType::Battery => self.controller,
        }
    }

    /// Names of the enabled categories, for logging.
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.cpu, "cpu"),
            (self.gpu, "gpu"),
            (self.motherboard, "motherboard"),
            (self.memory, "memory"),
            (self.storage, "storage"),
            (self.network, "network"),
            (self.controller, "controller"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// A monitorable hardware component.
pub trait Device: Send {
    /// Display name as reported by the backend (may be empty).
    fn name(&self) -> &str;

    /// Backend-reported category.
    fn hardware_type(&self) -> HardwareType;

    /// Refreshes cached sensor values.
    fn update(&mut self) -> Result<()>;

    /// Returns the sensors with the values cached by the last `update()`.
    fn sensors(&self) -> Result<Vec<RawSensor>>;

    /// Returns nested devices (e.g. a Super-I/O chip on a motherboard).
    fn sub_devices(&mut self) -> &mut [Box<dyn Device>] {
        &mut []
    }
}

/// Opaque sensor backend: something that can be opened, enumerated and closed.
pub trait Backend: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Initializes the backend, enumerating only the selected categories.
    fn open(&mut self, selection: &DeviceSelection) -> Result<()>;

    /// Releases backend resources. Must tolerate being called repeatedly.
    fn close(&mut self) -> Result<()>;

    /// Returns the top-level devices discovered by `open()`.
    fn devices(&mut self) -> Result<&mut [Box<dyn Device>]>;
}
