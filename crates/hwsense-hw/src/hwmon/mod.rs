//! Linux hwmon backend.
//!
//! Reads `/sys/class/hwmon/hwmon*` chips and groups them into devices: CPU
//! temperature chips under a CPU package device, Super-I/O and ACPI chips
//! under a motherboard device, everything else top-level.

mod board;
mod chip;
mod cpu;

pub use board::{dmi_board_name, BoardDevice};
pub use chip::{classify, friendly_name, HwmonChip};
pub use cpu::{model_name, CpuDevice};

use crate::device::{Backend, Device, DeviceSelection, HardwareType};
use crate::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default sysfs mount point.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Default procfs mount point.
pub const DEFAULT_PROCFS_ROOT: &str = "/proc";

/// Reads a sysfs attribute, trimmed.
pub(crate) fn read_trimmed(path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Reads a numeric sysfs attribute. Unreadable or non-numeric → `None`.
pub(crate) fn read_value(path: &Path) -> Option<f64> {
    read_trimmed(path).ok()?.parse().ok()
}

/// Keeps paths whose file name is `<prefix><N><suffix>`, sorted by `N`.
pub(crate) fn sorted_by_index(
    paths: impl Iterator<Item = PathBuf>,
    prefix: &str,
    suffix: &str,
) -> Vec<(u32, PathBuf)> {
    let mut indexed: Vec<(u32, PathBuf)> = paths
        .filter_map(|path| {
            let index = path
                .file_name()?
                .to_str()?
                .strip_prefix(prefix)?
                .strip_suffix(suffix)?
                .parse()
                .ok()?;
            Some((index, path))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed
}

fn access_error(path: &Path, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::PermissionDenied => Error::AccessDenied(path.display().to_string()),
        io::ErrorKind::NotFound => Error::BackendUnavailable(path.display().to_string()),
        _ => Error::Io(e),
    }
}

/// Sensor backend over sysfs hwmon, procfs and cpufreq.
pub struct HwmonBackend {
    sysfs_root: PathBuf,
    procfs_root: PathBuf,
    devices: Vec<Box<dyn Device>>,
}

impl HwmonBackend {
    pub fn new() -> Self {
        Self::with_roots(DEFAULT_SYSFS_ROOT, DEFAULT_PROCFS_ROOT)
    }

    /// Creates a backend reading from alternative sysfs/procfs roots.
    pub fn with_roots(sysfs_root: impl Into<PathBuf>, procfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            procfs_root: procfs_root.into(),
            devices: Vec::new(),
        }
    }

    fn hwmon_dir(&self) -> PathBuf {
        self.sysfs_root.join("class/hwmon")
    }

    /// Lists `hwmonN` directories in index order.
    fn chip_dirs(&self) -> Result<Vec<PathBuf>> {
        let dir = self.hwmon_dir();
        let entries = std::fs::read_dir(&dir).map_err(|e| access_error(&dir, e))?;

        let paths = entries.filter_map(|entry| entry.ok().map(|e| e.path()));
        Ok(sorted_by_index(paths, "hwmon", "")
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    }
}

impl Default for HwmonBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HwmonBackend {
    fn name(&self) -> &str {
        "hwmon"
    }

    fn open(&mut self, selection: &DeviceSelection) -> Result<()> {
        self.devices.clear();

        let mut cpu_chips: Vec<Box<dyn Device>> = Vec::new();
        let mut board_chips: Vec<Box<dyn Device>> = Vec::new();
        let mut gpus: Vec<Box<dyn Device>> = Vec::new();
        let mut others: Vec<Box<dyn Device>> = Vec::new();

        for dir in self.chip_dirs()? {
            let driver = match read_trimmed(&dir.join("name")) {
                Ok(driver) => driver,
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    return Err(access_error(&dir, e));
                }
                Err(e) => {
                    debug!("Skipping {}: {}", dir.display(), e);
                    continue;
                }
            };

            let hardware_type = classify(&driver);
            if !selection.allows(hardware_type) {
                debug!("Skipping {} ({}): category disabled", driver, hardware_type);
                continue;
            }

            let chip = match HwmonChip::discover(&dir, &driver, hardware_type) {
                Ok(chip) => Box::new(chip) as Box<dyn Device>,
                Err(e) => {
                    warn!("Failed to scan {}: {}", dir.display(), e);
                    continue;
                }
            };

            match hardware_type {
                HardwareType::Cpu => cpu_chips.push(chip),
                HardwareType::Motherboard | HardwareType::SuperIo => board_chips.push(chip),
                HardwareType::Gpu => gpus.push(chip),
                _ => others.push(chip),
            }
        }

        if selection.cpu {
            self.devices
                .push(Box::new(CpuDevice::new(&self.sysfs_root, &self.procfs_root, cpu_chips)));
        }
        self.devices.extend(gpus);
        if !board_chips.is_empty() {
            self.devices
                .push(Box::new(BoardDevice::new(&self.sysfs_root, board_chips)));
        }
        self.devices.extend(others);

        info!("hwmon backend found {} devices", self.devices.len());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.devices.clear();
        Ok(())
    }

    fn devices(&mut self) -> Result<&mut [Box<dyn Device>]> {
        let dir = self.hwmon_dir();
        if !dir.exists() {
            return Err(Error::Enumeration(format!("{} disappeared", dir.display())));
        }
        Ok(&mut self.devices)
    }
}
