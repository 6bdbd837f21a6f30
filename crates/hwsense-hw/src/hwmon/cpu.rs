//! CPU package device: load from `/proc/stat`, clocks from cpufreq.

use super::{read_trimmed, read_value, sorted_by_index};
use crate::device::{Device, HardwareType};
use crate::sensor::{RawSensor, SensorType};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Idle and total jiffies of one `cpu*` line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

/// Parses every `cpu` / `cpuN` line of `/proc/stat`, aggregate first.
fn parse_stat(content: &str) -> Vec<CpuTimes> {
    content
        .lines()
        .filter(|line| line.starts_with("cpu"))
        .filter_map(|line| {
            let parts: Vec<u64> = line
                .split_whitespace()
                .skip(1)
                .filter_map(|s| s.parse().ok())
                .collect();

            // idle + iowait count as idle time.
            if parts.len() >= 4 {
                let idle = parts[3] + parts.get(4).copied().unwrap_or(0);
                Some(CpuTimes {
                    idle,
                    total: parts.iter().sum(),
                })
            } else {
                None
            }
        })
        .collect()
}

fn load(previous: CpuTimes, current: CpuTimes) -> Option<f64> {
    let idle_delta = current.idle.saturating_sub(previous.idle);
    let total_delta = current.total.saturating_sub(previous.total);
    if total_delta == 0 {
        return None;
    }
    Some(100.0 * (1.0 - (idle_delta as f64 / total_delta as f64)))
}

/// CPU model name from `/proc/cpuinfo`.
pub fn model_name(procfs_root: &Path) -> Option<String> {
    let cpuinfo = fs::read_to_string(procfs_root.join("cpuinfo")).ok()?;
    cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// The CPU package. Temperature chips (k10temp, coretemp, ...) hang off it as
/// sub-devices.
pub struct CpuDevice {
    name: String,
    stat_path: PathBuf,
    clock_paths: Vec<(u32, PathBuf)>,
    previous: Vec<CpuTimes>,
    loads: Vec<Option<f64>>,
    clocks: Vec<Option<f64>>,
    chips: Vec<Box<dyn Device>>,
}

impl CpuDevice {
    pub fn new(sysfs_root: &Path, procfs_root: &Path, chips: Vec<Box<dyn Device>>) -> Self {
        let pattern = sysfs_root.join("devices/system/cpu/cpu[0-9]*");
        let clock_paths = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => sorted_by_index(paths.filter_map(|p| p.ok()), "cpu", "")
                .into_iter()
                .map(|(index, dir)| (index, dir.join("cpufreq/scaling_cur_freq")))
                .filter(|(_, path)| path.exists())
                .collect(),
            Err(_) => Vec::new(),
        };

        Self {
            name: model_name(procfs_root).unwrap_or_else(|| "CPU".to_string()),
            stat_path: procfs_root.join("stat"),
            clocks: vec![None; clock_paths.len()],
            clock_paths,
            previous: Vec::new(),
            loads: Vec::new(),
            chips,
        }
    }
}

impl Device for CpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn hardware_type(&self) -> HardwareType {
        HardwareType::Cpu
    }

    fn update(&mut self) -> Result<()> {
        let content = read_trimmed(&self.stat_path)
            .map_err(|e| Error::device(&self.name, format!("{}: {}", self.stat_path.display(), e)))?;
        let current = parse_stat(&content);

        // The first sample (or a hotplug changing the CPU count) has nothing
        // to diff against.
        self.loads = if self.previous.len() == current.len() {
            self.previous
                .iter()
                .zip(&current)
                .map(|(prev, cur)| load(*prev, *cur))
                .collect()
        } else {
            vec![None; current.len()]
        };
        self.previous = current;

        for (slot, (_, path)) in self.clocks.iter_mut().zip(&self.clock_paths) {
            // kHz -> MHz
            *slot = read_value(path).map(|khz| khz / 1000.0);
        }
        Ok(())
    }

    fn sensors(&self) -> Result<Vec<RawSensor>> {
        let mut sensors = Vec::with_capacity(self.loads.len() + self.clocks.len());

        if let Some((total, cores)) = self.loads.split_first() {
            sensors.push(RawSensor::new("CPU Total", SensorType::Load, *total));
            for (i, value) in cores.iter().enumerate() {
                sensors.push(RawSensor::new(format!("CPU Core #{}", i + 1), SensorType::Load, *value));
            }
        }

        for ((index, _), value) in self.clock_paths.iter().zip(&self.clocks) {
            sensors.push(RawSensor::new(format!("Core #{}", index + 1), SensorType::Clock, *value));
        }

        Ok(sensors)
    }

    fn sub_devices(&mut self) -> &mut [Box<dyn Device>] {
        &mut self.chips
    }
}
