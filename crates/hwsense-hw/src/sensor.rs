//! Sensor types, unit derivation and immutable readings.

use crate::device::HardwareType;
use crate::{Error, Result};
use serde::Serialize;
use std::str::FromStr;

/// Name used when a device reports an empty display name.
pub const UNKNOWN_HARDWARE: &str = "Unknown";

/// Name used when a sensor reports an empty display name.
pub const UNKNOWN_SENSOR: &str = "Unknown Sensor";

/// Kind of measurement a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Fan,
    Voltage,
    Clock,
    Load,
    Power,
    Data,
    Throughput,
    Level,
    /// Anything the unit table does not know about (current, energy, ...).
    Other,
}

impl SensorType {
    /// All sensor types, in filter display order.
    pub const ALL: [SensorType; 10] = [
        SensorType::Temperature,
        SensorType::Fan,
        SensorType::Voltage,
        SensorType::Clock,
        SensorType::Load,
        SensorType::Power,
        SensorType::Data,
        SensorType::Throughput,
        SensorType::Level,
        SensorType::Other,
    ];

    /// Returns the display unit for values of this type.
    ///
    /// Total over every variant; unknown kinds map to an empty string.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::Fan => "RPM",
            SensorType::Voltage => "V",
            SensorType::Clock => "MHz",
            SensorType::Load => "%",
            SensorType::Power => "W",
            SensorType::Data => "GB",
            SensorType::Throughput => "MB/s",
            SensorType::Level => "%",
            SensorType::Other => "",
        }
    }
}

impl FromStr for SensorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "temperature" | "temp" => Ok(SensorType::Temperature),
            "fan" => Ok(SensorType::Fan),
            "voltage" => Ok(SensorType::Voltage),
            "clock" => Ok(SensorType::Clock),
            "load" => Ok(SensorType::Load),
            "power" => Ok(SensorType::Power),
            "data" => Ok(SensorType::Data),
            "throughput" => Ok(SensorType::Throughput),
            "level" => Ok(SensorType::Level),
            "other" => Ok(SensorType::Other),
            _ => Err(Error::InvalidSensorType(s.to_string())),
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorType::Temperature => write!(f, "temperature"),
            SensorType::Fan => write!(f, "fan"),
            SensorType::Voltage => write!(f, "voltage"),
            SensorType::Clock => write!(f, "clock"),
            SensorType::Load => write!(f, "load"),
            SensorType::Power => write!(f, "power"),
            SensorType::Data => write!(f, "data"),
            SensorType::Throughput => write!(f, "throughput"),
            SensorType::Level => write!(f, "level"),
            SensorType::Other => write!(f, "other"),
        }
    }
}

/// A sensor value as reported by a backend device, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSensor {
    pub name: String,
    pub sensor_type: SensorType,
    /// `None` when the backend has no defined value this cycle.
    pub value: Option<f64>,
}

impl RawSensor {
    pub fn new(name: impl Into<String>, sensor_type: SensorType, value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            sensor_type,
            value,
        }
    }
}

/// One sensor value captured during a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub hardware_name: String,
    pub hardware_type: HardwareType,
    pub sensor_name: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub unit: &'static str,
}

impl SensorReading {
    /// Builds a reading from backend data.
    ///
    /// Returns `None` when the sensor has no defined (finite) value; such
    /// sensors are left out of snapshots entirely.
    pub fn from_raw(hardware_name: &str, hardware_type: HardwareType, raw: &RawSensor) -> Option<Self> {
        let value = raw.value.filter(|v| v.is_finite())?;
        Some(Self {
            hardware_name: display_name(hardware_name, UNKNOWN_HARDWARE),
            hardware_type,
            sensor_name: display_name(&raw.name, UNKNOWN_SENSOR),
            sensor_type: raw.sensor_type,
            value,
            unit: raw.sensor_type.unit(),
        })
    }
}

/// Returns `name` trimmed, or `fallback` when nothing is left.
pub fn display_name(name: &str, fallback: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
