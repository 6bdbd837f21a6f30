//! Error types for the hwsense hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a sensor backend.
#[derive(Error, Debug)]
pub enum Error {
    /// The hardware access session could not be opened.
    #[error("Cannot open hardware access session: {0}")]
    Access(String),

    /// The backend refused access (usually missing privileges).
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The backend is not present on this system.
    #[error("Sensor backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single device failed to update or report its sensors.
    #[error("Device '{device}' failed: {reason}")]
    Device { device: String, reason: String },

    /// Walking the device list failed as a whole.
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    /// The backend ran out of a resource it cannot recover.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The backend reported corrupted internal state.
    #[error("Backend state corrupted: {0}")]
    Corrupted(String),

    /// Sysfs / procfs I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid sensor type name.
    #[error("Invalid sensor type: {0}")]
    InvalidSensorType(String),

    /// Invalid hardware type name.
    #[error("Invalid hardware type: {0}")]
    InvalidHardwareType(String),
}

impl Error {
    /// Creates a device-scoped error.
    pub fn device(device: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Device {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures that must stop monitoring instead of being
    /// retried on the next cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::ResourceExhausted(_) | Error::Corrupted(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::OutOfMemory,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::ResourceExhausted("handles".into()).is_fatal());
        assert!(Error::Corrupted("ring buffer".into()).is_fatal());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::OutOfMemory)).is_fatal());

        assert!(!Error::device("nct6798", "timeout").is_fatal());
        assert!(!Error::Enumeration("gone".into()).is_fatal());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_fatal());
        assert!(!Error::Access("denied".into()).is_fatal());
    }

    #[test]
    fn test_device_error_message() {
        let err = Error::device("GPU", "read failed");
        assert_eq!(err.to_string(), "Device 'GPU' failed: read failed");
    }
}
