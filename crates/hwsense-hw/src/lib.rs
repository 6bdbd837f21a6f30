//! hwsense hardware library
//!
//! Hardware sensor access for hwsense: a session around a pluggable sensor
//! backend, best-effort snapshot collection over the device tree, unit
//! derivation and category views. The bundled backend reads Linux hwmon.

pub mod collector;
pub mod device;
pub mod error;
pub mod events;
pub mod hwmon;
pub mod sensor;
pub mod session;
pub mod view;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use collector::{collect, Snapshot};
pub use device::{Backend, Device, DeviceSelection, HardwareType};
pub use error::{Error, Result};
pub use events::{trace_event, Event, EventLevel, EventSink};
pub use hwmon::HwmonBackend;
pub use sensor::{RawSensor, SensorReading, SensorType};
pub use session::{HardwareSession, SessionState};
pub use view::{parse_filter, project};
