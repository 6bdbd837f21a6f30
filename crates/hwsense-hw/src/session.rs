//! Hardware access session: the open/close lifecycle around a backend.

use crate::device::{Backend, Device, DeviceSelection};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Open,
}

/// Owns a backend handle that must be opened before any sensor can be read.
pub struct HardwareSession {
    backend: Box<dyn Backend>,
    selection: DeviceSelection,
    state: SessionState,
}

impl HardwareSession {
    /// Creates a closed session that will enumerate the selected categories.
    pub fn new(backend: Box<dyn Backend>, selection: DeviceSelection) -> Self {
        debug!(
            "Configured {} session for: {}",
            backend.name(),
            selection.enabled().join(", ")
        );
        Self {
            backend,
            selection,
            state: SessionState::Closed,
        }
    }

    /// Opens the backend. No-op if already open.
    ///
    /// Any initialization failure is reported as [`Error::Access`].
    pub fn open(&mut self) -> Result<()> {
        if self.state == SessionState::Open {
            return Ok(());
        }

        self.backend
            .open(&self.selection)
            .map_err(|e| match e {
                Error::Access(_) => e,
                other => Error::Access(other.to_string()),
            })?;

        self.state = SessionState::Open;
        info!("{} session opened", self.backend.name());
        Ok(())
    }

    /// Closes the backend. No-op if already closed; failures are only logged.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        match self.backend.close() {
            Ok(()) => info!("{} session closed", self.backend.name()),
            Err(e) => warn!("Failed to close {} session: {}", self.backend.name(), e),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while the session is open.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Returns the category selection fixed at construction.
    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    /// Returns the backend name.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Returns the top-level devices, or nothing when the session is closed.
    pub fn devices(&mut self) -> Result<&mut [Box<dyn Device>]> {
        if self.state != SessionState::Open {
            return Ok(&mut []);
        }
        self.backend.devices()
    }
}

impl Drop for HardwareSession {
    fn drop(&mut self) {
        // Disposal always attempts a close, whatever state we think we are in.
        self.state = SessionState::Closed;
        if let Err(e) = self.backend.close() {
            warn!("Failed to close {} session on drop: {}", self.backend.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBackend, FakeDevice};
    use crate::device::HardwareType;

    fn session(backend: FakeBackend) -> HardwareSession {
        HardwareSession::new(Box::new(backend), DeviceSelection::default())
    }

    #[test]
    fn test_open_close_idempotent() {
        let backend = FakeBackend::new().with_device(FakeDevice::new("CPU", HardwareType::Cpu));
        let counters = backend.counters();
        let mut session = session(backend);

        assert_eq!(session.state(), SessionState::Closed);
        session.open().unwrap();
        session.open().unwrap();
        assert!(session.is_open());
        assert_eq!(counters.opens(), 1);

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(counters.closes(), 1);
    }

    #[test]
    fn test_open_failure_is_access_error() {
        let backend = FakeBackend::new().fail_open("not root");
        let mut session = session(backend);

        let err = session.open().unwrap_err();
        assert!(matches!(err, Error::Access(_)));
        assert!(err.to_string().contains("not root"));
        assert!(!session.is_open());
    }

    #[test]
    fn test_devices_empty_when_closed() {
        let backend = FakeBackend::new().with_device(FakeDevice::new("GPU", HardwareType::Gpu));
        let mut session = session(backend);
        assert!(session.devices().unwrap().is_empty());

        session.open().unwrap();
        assert_eq!(session.devices().unwrap().len(), 1);

        session.close();
        assert!(session.devices().unwrap().is_empty());
    }

    #[test]
    fn test_drop_always_closes() {
        let backend = FakeBackend::new();
        let counters = backend.counters();
        drop(session(backend));
        assert_eq!(counters.closes(), 1);
    }

    #[test]
    fn test_close_failure_is_swallowed() {
        let backend = FakeBackend::new().fail_close();
        let counters = backend.counters();
        let mut session = session(backend);
        session.open().unwrap();
        session.close();
        assert!(!session.is_open());
        assert_eq!(counters.closes(), 1);
    }
}
