//! Scripted in-memory backend for tests.
//!
//! Devices can be told to fail, panic or block inside `update()` so the
//! collector and the coordinator can be exercised without real hardware.

use crate::device::{Backend, Device, DeviceSelection, HardwareType};
use crate::events::{Event, EventSink};
use crate::sensor::{RawSensor, SensorType};
use crate::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// How a scripted call should fail.
#[derive(Debug, Clone)]
pub enum FakeFailure {
    /// Ordinary, recoverable device error.
    Device(String),
    /// Fatal error (resource exhaustion).
    Fatal(String),
    /// Panic inside the backend.
    Panic(String),
}

impl FakeFailure {
    fn raise(&self, device: &str) -> Error {
        match self {
            FakeFailure::Device(reason) => Error::device(device, reason),
            FakeFailure::Fatal(reason) => Error::ResourceExhausted(reason.clone()),
            FakeFailure::Panic(reason) => panic!("{}", reason),
        }
    }
}

/// Call counters shared between a backend, its devices and the test.
#[derive(Debug, Default)]
pub struct FakeCounters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    updates: AtomicUsize,
}

impl FakeCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

/// Blocks `update()` until released by the test.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    /// Creates a gate that holds callers until [`Gate::release`].
    pub fn closed() -> Self {
        Self::default()
    }

    /// Lets every current and future caller through.
    pub fn release(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*open {
            open = cvar.wait(open).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Scripted device.
pub struct FakeDevice {
    name: String,
    hardware_type: HardwareType,
    sensors: Vec<RawSensor>,
    sub_devices: Vec<Box<dyn Device>>,
    update_failure: Option<FakeFailure>,
    sensors_failure: Option<FakeFailure>,
    gate: Option<Gate>,
    counters: Arc<FakeCounters>,
}

impl FakeDevice {
    pub fn new(name: &str, hardware_type: HardwareType) -> Self {
        Self {
            name: name.to_string(),
            hardware_type,
            sensors: Vec::new(),
            sub_devices: Vec::new(),
            update_failure: None,
            sensors_failure: None,
            gate: None,
            counters: Arc::default(),
        }
    }

    pub fn with_sensor(mut self, name: &str, sensor_type: SensorType, value: Option<f64>) -> Self {
        self.sensors.push(RawSensor::new(name, sensor_type, value));
        self
    }

    pub fn with_sub_device(mut self, device: FakeDevice) -> Self {
        self.sub_devices.push(Box::new(device));
        self
    }

    pub fn fail_update(mut self, failure: FakeFailure) -> Self {
        self.update_failure = Some(failure);
        self
    }

    pub fn fail_sensors(mut self, failure: FakeFailure) -> Self {
        self.sensors_failure = Some(failure);
        self
    }

    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    fn attach(&mut self, counters: &Arc<FakeCounters>) {
        self.counters = counters.clone();
    }
}

impl Device for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn hardware_type(&self) -> HardwareType {
        self.hardware_type
    }

    fn update(&mut self) -> Result<()> {
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match &self.update_failure {
            Some(failure) => Err(failure.raise(&self.name)),
            None => Ok(()),
        }
    }

    fn sensors(&self) -> Result<Vec<RawSensor>> {
        match &self.sensors_failure {
            Some(failure) => Err(failure.raise(&self.name)),
            None => Ok(self.sensors.clone()),
        }
    }

    fn sub_devices(&mut self) -> &mut [Box<dyn Device>] {
        &mut self.sub_devices
    }
}

/// Scripted backend.
pub struct FakeBackend {
    devices: Vec<Box<dyn Device>>,
    open_failure: Option<String>,
    close_fails: bool,
    enumeration_failure: Option<FakeFailure>,
    counters: Arc<FakeCounters>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            open_failure: None,
            close_fails: false,
            enumeration_failure: None,
            counters: Arc::default(),
        }
    }

    pub fn with_device(mut self, mut device: FakeDevice) -> Self {
        device.attach(&self.counters);
        self.devices.push(Box::new(device));
        self
    }

    /// Makes `open()` fail as if privileges were missing.
    pub fn fail_open(mut self, reason: &str) -> Self {
        self.open_failure = Some(reason.to_string());
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    pub fn fail_enumeration(mut self, failure: FakeFailure) -> Self {
        self.enumeration_failure = Some(failure);
        self
    }

    pub fn counters(&self) -> Arc<FakeCounters> {
        self.counters.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn open(&mut self, _selection: &DeviceSelection) -> Result<()> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        match &self.open_failure {
            Some(reason) => Err(Error::AccessDenied(reason.clone())),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(Error::Io(std::io::Error::other("close failed")));
        }
        Ok(())
    }

    fn devices(&mut self) -> Result<&mut [Box<dyn Device>]> {
        match &self.enumeration_failure {
            Some(FakeFailure::Device(reason)) => Err(Error::Enumeration(reason.clone())),
            Some(failure) => Err(failure.raise("backend")),
            None => Ok(&mut self.devices),
        }
    }
}

/// Sink that records every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
