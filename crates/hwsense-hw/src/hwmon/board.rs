//! Motherboard device grouping Super-I/O and ACPI chips.

use crate::device::{Device, HardwareType};
use crate::sensor::RawSensor;
use crate::Result;
use std::path::Path;

use super::read_trimmed;

/// Board name from DMI (`board_vendor board_name`).
pub fn dmi_board_name(sysfs_root: &Path) -> Option<String> {
    let dmi = sysfs_root.join("class/dmi/id");
    let vendor = read_trimmed(&dmi.join("board_vendor")).unwrap_or_default();
    let board = read_trimmed(&dmi.join("board_name")).unwrap_or_default();

    let name = format!("{} {}", vendor, board).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// The motherboard. Has no sensors of its own.
pub struct BoardDevice {
    name: String,
    chips: Vec<Box<dyn Device>>,
}

impl BoardDevice {
    pub fn new(sysfs_root: &Path, chips: Vec<Box<dyn Device>>) -> Self {
        Self {
            name: dmi_board_name(sysfs_root).unwrap_or_else(|| "Motherboard".to_string()),
            chips,
        }
    }
}

impl Device for BoardDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn hardware_type(&self) -> HardwareType {
        HardwareType::Motherboard
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn sensors(&self) -> Result<Vec<RawSensor>> {
        Ok(Vec::new())
    }

    fn sub_devices(&mut self) -> &mut [Box<dyn Device>] {
        &mut self.chips
    }
}
