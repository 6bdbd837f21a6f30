//! Snapshot collection: one best-effort walk over the device tree.

use crate::device::Device;
use crate::events::{Event, EventSink};
use crate::sensor::{display_name, SensorReading, UNKNOWN_HARDWARE};
use crate::session::HardwareSession;
use crate::Result;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// The readings produced by one completed poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    readings: Arc<[SensorReading]>,
    taken_at: Option<SystemTime>,
    sequence: u64,
}

impl Snapshot {
    /// Creates a snapshot taken now.
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self {
            readings: readings.into(),
            taken_at: Some(SystemTime::now()),
            sequence: 0,
        }
    }

    /// Returns a copy stamped with a publication sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SensorReading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// When the readings were taken (`None` for the empty snapshot).
    pub fn taken_at(&self) -> Option<SystemTime> {
        self.taken_at
    }

    /// Publication sequence number (0 = never published).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a SensorReading;
    type IntoIter = std::slice::Iter<'a, SensorReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

/// Collects one snapshot from the session.
///
/// A closed session yields an empty snapshot. Device, sub-device and
/// enumeration failures are reported to `events` and skipped; only failures
/// for which [`crate::Error::is_fatal`] holds are returned.
pub fn collect(session: &mut HardwareSession, events: &dyn EventSink) -> Result<Snapshot> {
    let mut readings = Vec::new();

    if !session.is_open() {
        return Ok(Snapshot::default());
    }

    let devices = match session.devices() {
        Ok(devices) => devices,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            events.emit(Event::error(format!("Sensor collection failed: {}", e)));
            return Ok(Snapshot::new(readings));
        }
    };

    for device in devices.iter_mut() {
        collect_device(device.as_mut(), None, &mut readings, events)?;
    }

    debug!("Collected {} readings", readings.len());
    Ok(Snapshot::new(readings))
}

/// Updates one device and appends its readings, then walks its sub-devices.
///
/// `parent` is the display name of the immediate owner for sub-devices; it
/// only scopes the warning events.
fn collect_device(
    device: &mut dyn Device,
    parent: Option<&str>,
    readings: &mut Vec<SensorReading>,
    events: &dyn EventSink,
) -> Result<()> {
    let name = display_name(device.name(), UNKNOWN_HARDWARE);

    if let Err(e) = device.update() {
        if e.is_fatal() {
            return Err(e);
        }
        let event = match parent {
            Some(parent) => Event::warning(format!("Failed to update {} on {}: {}", name, parent, e))
                .with_device(parent)
                .with_sub_device(&name),
            None => Event::warning(format!("Failed to update {}: {}", name, e)).with_device(&name),
        };
        events.emit(event);
        return Ok(());
    }

    match device.sensors() {
        Ok(sensors) => {
            let hardware_type = device.hardware_type();
            readings.extend(
                sensors
                    .iter()
                    .filter_map(|raw| SensorReading::from_raw(&name, hardware_type, raw)),
            );
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            let event = Event::warning(format!("Failed to read sensors of {}: {}", name, e));
            events.emit(match parent {
                Some(parent) => event.with_device(parent).with_sub_device(&name),
                None => event.with_device(&name),
            });
        }
    }

    for sub_device in device.sub_devices() {
        collect_device(sub_device.as_mut(), Some(&name), readings, events)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceSelection, HardwareType};
    use crate::events::EventLevel;
    use crate::fake::{FakeBackend, FakeDevice, FakeFailure, RecordingSink};
    use crate::sensor::SensorType;
    use crate::Error;

    fn open_session(backend: FakeBackend) -> HardwareSession {
        let mut session = HardwareSession::new(Box::new(backend), DeviceSelection::default());
        session.open().unwrap();
        session
    }

    fn names(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|r| r.sensor_name.as_str()).collect()
    }

    #[test]
    fn test_closed_session_yields_empty_snapshot() {
        let backend = FakeBackend::new().with_device(
            FakeDevice::new("CPU", HardwareType::Cpu).with_sensor("Tctl", SensorType::Temperature, Some(50.0)),
        );
        let mut session = HardwareSession::new(Box::new(backend), DeviceSelection::default());
        let sink = RecordingSink::new();

        let snapshot = collect(&mut session, &sink).unwrap();
        assert!(snapshot.is_empty());
        assert!(snapshot.taken_at().is_none());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_enumeration_order() {
        let backend = FakeBackend::new()
            .with_device(
                FakeDevice::new("Ryzen 7 5800X", HardwareType::Cpu)
                    .with_sensor("Core (Tctl/Tdie)", SensorType::Temperature, Some(48.5))
                    .with_sensor("CPU Total", SensorType::Load, Some(12.0)),
            )
            .with_device(
                FakeDevice::new("Radeon RX 6700", HardwareType::Gpu)
                    .with_sensor("GPU Core", SensorType::Clock, Some(2400.0)),
            );
        let mut session = open_session(backend);

        let snapshot = collect(&mut session, &RecordingSink::new()).unwrap();
        assert_eq!(names(&snapshot), vec!["Core (Tctl/Tdie)", "CPU Total", "GPU Core"]);
        assert_eq!(snapshot.readings()[0].unit, "°C");
        assert_eq!(snapshot.readings()[0].hardware_type, HardwareType::Cpu);
        assert_eq!(snapshot.readings()[2].hardware_name, "Radeon RX 6700");
    }

    #[test]
    fn test_failing_device_is_skipped() {
        let backend = FakeBackend::new()
            .with_device(FakeDevice::new("CPU", HardwareType::Cpu).with_sensor("Tctl", SensorType::Temperature, Some(40.0)))
            .with_device(
                FakeDevice::new("GPU", HardwareType::Gpu)
                    .with_sensor("GPU Core", SensorType::Temperature, Some(60.0))
                    .fail_update(FakeFailure::Device("driver timeout".into())),
            )
            .with_device(
                FakeDevice::new("Motherboard", HardwareType::Motherboard)
                    .with_sensor("System", SensorType::Temperature, Some(35.0)),
            );
        let mut session = open_session(backend);
        let sink = RecordingSink::new();

        let snapshot = collect(&mut session, &sink).unwrap();
        assert_eq!(names(&snapshot), vec!["Tctl", "System"]);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Warning);
        assert_eq!(events[0].device.as_deref(), Some("GPU"));
        assert!(events[0].message.contains("GPU"));
        assert!(events[0].message.contains("driver timeout"));
    }

    #[test]
    fn test_failing_sub_device_is_isolated() {
        let board = FakeDevice::new("ROG STRIX B550-F", HardwareType::Motherboard)
            .with_sub_device(
                FakeDevice::new("Nuvoton NCT6798D", HardwareType::SuperIo)
                    .with_sensor("Fan #1", SensorType::Fan, Some(950.0))
                    .fail_update(FakeFailure::Device("port busy".into())),
            )
            .with_sub_device(
                FakeDevice::new("ACPI", HardwareType::Motherboard)
                    .with_sensor("Thermal Zone", SensorType::Temperature, Some(27.8)),
            );
        let backend = FakeBackend::new()
            .with_device(board)
            .with_device(FakeDevice::new("CPU", HardwareType::Cpu).with_sensor("Tctl", SensorType::Temperature, Some(41.0)));
        let mut session = open_session(backend);
        let sink = RecordingSink::new();

        let snapshot = collect(&mut session, &sink).unwrap();
        assert_eq!(names(&snapshot), vec!["Thermal Zone", "Tctl"]);
        assert_eq!(snapshot.readings()[0].hardware_name, "ACPI");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device.as_deref(), Some("ROG STRIX B550-F"));
        assert_eq!(events[0].sub_device.as_deref(), Some("Nuvoton NCT6798D"));
    }

    #[test]
    fn test_sensor_extraction_failure_keeps_sub_devices() {
        let backend = FakeBackend::new().with_device(
            FakeDevice::new("GPU", HardwareType::Gpu)
                .with_sensor("GPU Core", SensorType::Load, Some(99.0))
                .fail_sensors(FakeFailure::Device("bad sensor table".into()))
                .with_sub_device(
                    FakeDevice::new("GPU Fan Controller", HardwareType::Cooler)
                        .with_sensor("Fan", SensorType::Fan, Some(1500.0)),
                ),
        );
        let mut session = open_session(backend);
        let sink = RecordingSink::new();

        let snapshot = collect(&mut session, &sink).unwrap();
        assert_eq!(names(&snapshot), vec!["Fan"]);
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].level, EventLevel::Warning);
    }

    #[test]
    fn test_nested_failures_name_immediate_parent() {
        let board = FakeDevice::new("Motherboard", HardwareType::Motherboard).with_sub_device(
            FakeDevice::new("Nuvoton NCT6798D", HardwareType::SuperIo)
                .with_sensor("Fan #1", SensorType::Fan, Some(950.0))
                .fail_sensors(FakeFailure::Device("bank select failed".into()))
                .with_sub_device(
                    FakeDevice::new("Fan Hub", HardwareType::Cooler)
                        .fail_update(FakeFailure::Device("no response".into())),
                ),
        );
        let mut session = open_session(FakeBackend::new().with_device(board));
        let sink = RecordingSink::new();

        let snapshot = collect(&mut session, &sink).unwrap();
        assert!(snapshot.is_empty());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].device.as_deref(), Some("Motherboard"));
        assert_eq!(events[0].sub_device.as_deref(), Some("Nuvoton NCT6798D"));
        assert!(events[0].message.contains("bank select failed"));

        assert_eq!(events[1].device.as_deref(), Some("Nuvoton NCT6798D"));
        assert_eq!(events[1].sub_device.as_deref(), Some("Fan Hub"));
        assert_eq!(events[1].message, "Failed to update Fan Hub on Nuvoton NCT6798D: Device 'Fan Hub' failed: no response");
    }

    #[test]
    fn test_undefined_values_are_excluded() {
        let backend = FakeBackend::new().with_device(
            FakeDevice::new("CPU", HardwareType::Cpu)
                .with_sensor("CPU Total", SensorType::Load, None)
                .with_sensor("Tctl", SensorType::Temperature, Some(45.0))
                .with_sensor("Package", SensorType::Power, Some(f64::NAN)),
        );
        let mut session = open_session(backend);

        let snapshot = collect(&mut session, &RecordingSink::new()).unwrap();
        assert_eq!(names(&snapshot), vec!["Tctl"]);
        assert!(snapshot.iter().all(|r| r.value.is_finite()));
    }

    #[test]
    fn test_enumeration_failure_is_absorbed() {
        let backend = FakeBackend::new()
            .with_device(FakeDevice::new("CPU", HardwareType::Cpu).with_sensor("Tctl", SensorType::Temperature, Some(45.0)))
            .fail_enumeration(FakeFailure::Device("sysfs vanished".into()));
        let mut session = open_session(backend);
        let sink = RecordingSink::new();

        let snapshot = collect(&mut session, &sink).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].level, EventLevel::Error);
    }

    #[test]
    fn test_fatal_failure_is_returned() {
        let backend = FakeBackend::new()
            .with_device(FakeDevice::new("CPU", HardwareType::Cpu).with_sensor("Tctl", SensorType::Temperature, Some(45.0)))
            .with_device(
                FakeDevice::new("GPU", HardwareType::Gpu).fail_update(FakeFailure::Fatal("out of handles".into())),
            );
        let mut session = open_session(backend);

        let err = collect(&mut session, &RecordingSink::new()).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
    }

    #[test]
    fn test_empty_device_name_defaults() {
        let backend = FakeBackend::new().with_device(
            FakeDevice::new("", HardwareType::Controller).with_sensor("", SensorType::Other, Some(1.0)),
        );
        let mut session = open_session(backend);

        let snapshot = collect(&mut session, &RecordingSink::new()).unwrap();
        let reading = &snapshot.readings()[0];
        assert_eq!(reading.hardware_name, "Unknown");
        assert_eq!(reading.sensor_name, "Unknown Sensor");
        assert_eq!(reading.unit, "");
    }
}
