//! A single `/sys/class/hwmon/hwmonN` chip.

use super::{read_trimmed, read_value, sorted_by_index};
use crate::device::{Device, HardwareType};
use crate::sensor::{RawSensor, SensorType};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hwmon channel family and the scale from its raw sysfs unit.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ChannelKind {
    Temp,
    Fan,
    In,
    Power,
    PowerAverage,
    Freq,
    Curr,
    Energy,
    Humidity,
}

impl ChannelKind {
    const ALL: [ChannelKind; 9] = [
        ChannelKind::Temp,
        ChannelKind::Fan,
        ChannelKind::In,
        ChannelKind::Power,
        ChannelKind::PowerAverage,
        ChannelKind::Freq,
        ChannelKind::Curr,
        ChannelKind::Energy,
        ChannelKind::Humidity,
    ];

    fn prefix(self) -> &'static str {
        match self {
            ChannelKind::Temp => "temp",
            ChannelKind::Fan => "fan",
            ChannelKind::In => "in",
            ChannelKind::Power | ChannelKind::PowerAverage => "power",
            ChannelKind::Freq => "freq",
            ChannelKind::Curr => "curr",
            ChannelKind::Energy => "energy",
            ChannelKind::Humidity => "humidity",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ChannelKind::PowerAverage => "average",
            _ => "input",
        }
    }

    fn sensor_type(self) -> SensorType {
        match self {
            ChannelKind::Temp => SensorType::Temperature,
            ChannelKind::Fan => SensorType::Fan,
            ChannelKind::In => SensorType::Voltage,
            ChannelKind::Power | ChannelKind::PowerAverage => SensorType::Power,
            ChannelKind::Freq => SensorType::Clock,
            ChannelKind::Humidity => SensorType::Level,
            ChannelKind::Curr | ChannelKind::Energy => SensorType::Other,
        }
    }

    /// Divisor from the raw sysfs value to the display unit.
    fn divisor(self) -> f64 {
        match self {
            // m°C, mV, m% -> °C, V, %
            ChannelKind::Temp | ChannelKind::In | ChannelKind::Humidity => 1e3,
            ChannelKind::Fan => 1.0,
            // µW -> W
            ChannelKind::Power | ChannelKind::PowerAverage => 1e6,
            // Hz -> MHz
            ChannelKind::Freq => 1e6,
            // mA and µJ have no display unit; report A and J.
            ChannelKind::Curr => 1e3,
            ChannelKind::Energy => 1e6,
        }
    }

    fn default_label(self, index: u32) -> String {
        let base = match self {
            ChannelKind::Temp => "Temperature",
            ChannelKind::Fan => "Fan",
            ChannelKind::In => "Voltage",
            ChannelKind::Power => "Power",
            ChannelKind::PowerAverage => "Average Power",
            ChannelKind::Freq => "Clock",
            ChannelKind::Curr => "Current",
            ChannelKind::Energy => "Energy",
            ChannelKind::Humidity => "Humidity",
        };
        format!("{} #{}", base, index)
    }
}

#[derive(Debug, Clone)]
struct Channel {
    kind: ChannelKind,
    label: String,
    input: PathBuf,
}

/// Extra per-driver files outside the hwmon channel scheme.
#[derive(Debug, Clone)]
struct Extra {
    label: &'static str,
    sensor_type: SensorType,
    path: PathBuf,
    divisor: f64,
}

/// Maps a hwmon driver name to the hardware category it belongs to.
pub fn classify(driver: &str) -> HardwareType {
    let driver = driver.to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| driver.starts_with(p));

    if starts(&["k10temp", "coretemp", "zenpower", "cpu_thermal", "via_cputemp", "fam15h_power"]) {
        HardwareType::Cpu
    } else if starts(&["amdgpu", "radeon", "nouveau", "i915", "xe"]) {
        HardwareType::Gpu
    } else if starts(&["nct", "it87", "it86", "w83", "f71", "sch56", "asus", "dell_smm", "gigabyte"]) {
        HardwareType::SuperIo
    } else if starts(&["acpitz", "pch_"]) {
        HardwareType::Motherboard
    } else if starts(&["nvme", "drivetemp"]) {
        HardwareType::Storage
    } else if starts(&["spd5118", "jc42", "ee1004"]) {
        HardwareType::Memory
    } else if starts(&["r8169", "igb", "igc", "ixgbe", "iwlwifi", "mt79", "ath1"]) {
        HardwareType::Network
    } else if starts(&["corsairpsu", "nzxt_smart", "hp_wmi"]) {
        HardwareType::Psu
    } else if starts(&["nzxt", "kraken", "corsair", "aquacomputer", "d5next"]) {
        HardwareType::Cooler
    } else if starts(&["bat", "battery", "ucsi"]) {
        HardwareType::Battery
    } else {
        HardwareType::Controller
    }
}

/// Human-readable chip name for a driver.
pub fn friendly_name(driver: &str) -> String {
    let lower = driver.to_lowercase();
    if lower.starts_with("k10temp") {
        "AMD K10".to_string()
    } else if lower.starts_with("zenpower") {
        "AMD Zen".to_string()
    } else if lower.starts_with("coretemp") {
        "Intel Core".to_string()
    } else if lower.starts_with("amdgpu") || lower.starts_with("radeon") {
        "AMD Radeon".to_string()
    } else if lower.starts_with("nouveau") {
        "NVIDIA GeForce".to_string()
    } else if lower.starts_with("i915") || lower.starts_with("xe") {
        "Intel Graphics".to_string()
    } else if lower.starts_with("nct") {
        format!("Nuvoton {}", driver.to_uppercase())
    } else if lower.starts_with("it8") {
        format!("ITE {}", driver.to_uppercase())
    } else if lower.starts_with("acpitz") {
        "ACPI".to_string()
    } else if lower.starts_with("nvme") {
        "NVMe".to_string()
    } else {
        driver.to_string()
    }
}

/// One hwmon chip with its discovered channels and last-read values.
pub struct HwmonChip {
    dir: PathBuf,
    name: String,
    hardware_type: HardwareType,
    channels: Vec<Channel>,
    extras: Vec<Extra>,
    values: Vec<Option<f64>>,
}

impl HwmonChip {
    /// Scans `dir` for channels of a chip whose driver is `driver`.
    pub fn discover(dir: &Path, driver: &str, hardware_type: HardwareType) -> Result<Self> {
        let mut channels = Vec::new();
        for kind in ChannelKind::ALL {
            let pattern = dir.join(format!("{}*_{}", kind.prefix(), kind.suffix()));
            let pattern = pattern.to_string_lossy();
            let prefix = kind.prefix();
            let suffix = format!("_{}", kind.suffix());

            let paths = glob::glob(&pattern)
                .map_err(|e| Error::Enumeration(e.to_string()))?
                .filter_map(|p| p.ok());

            for (index, input) in sorted_by_index(paths, prefix, &suffix) {
                let label = read_trimmed(&dir.join(format!("{}{}_label", prefix, index)))
                    .ok()
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| kind.default_label(index));
                channels.push(Channel { kind, label, input });
            }
        }

        let mut extras = Vec::new();
        if driver.starts_with("amdgpu") {
            let device = dir.join("device");
            let busy = device.join("gpu_busy_percent");
            if busy.exists() {
                extras.push(Extra {
                    label: "GPU Core",
                    sensor_type: SensorType::Load,
                    path: busy,
                    divisor: 1.0,
                });
            }
            let vram = device.join("mem_info_vram_used");
            if vram.exists() {
                extras.push(Extra {
                    label: "GPU Memory Used",
                    sensor_type: SensorType::Data,
                    path: vram,
                    divisor: 1024.0 * 1024.0 * 1024.0,
                });
            }
        }

        debug!(
            "Discovered {} with {} channels in {}",
            driver,
            channels.len() + extras.len(),
            dir.display()
        );

        let values = vec![None; channels.len() + extras.len()];
        Ok(Self {
            dir: dir.to_path_buf(),
            name: friendly_name(driver),
            hardware_type,
            channels,
            extras,
            values,
        })
    }

    /// Number of channels, including driver extras.
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

impl Device for HwmonChip {
    fn name(&self) -> &str {
        &self.name
    }

    fn hardware_type(&self) -> HardwareType {
        self.hardware_type
    }

    fn update(&mut self) -> Result<()> {
        if !self.dir.exists() {
            return Err(Error::device(&self.name, "device removed"));
        }

        let channels = self
            .channels
            .iter()
            .map(|c| (c.input.as_path(), c.kind.divisor()));
        let extras = self.extras.iter().map(|e| (e.path.as_path(), e.divisor));

        // Idle channels commonly fail with EIO/ENODATA; those simply have no
        // value this cycle.
        for (slot, (path, divisor)) in self.values.iter_mut().zip(channels.chain(extras)) {
            *slot = read_value(path).map(|raw| raw / divisor);
        }
        Ok(())
    }

    fn sensors(&self) -> Result<Vec<RawSensor>> {
        let described = self
            .channels
            .iter()
            .map(|c| (c.label.as_str(), c.kind.sensor_type()))
            .chain(self.extras.iter().map(|e| (e.label, e.sensor_type)));

        Ok(described
            .zip(&self.values)
            .map(|((label, sensor_type), value)| RawSensor::new(label, sensor_type, *value))
            .collect())
    }
}
