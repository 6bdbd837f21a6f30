//! D-Bus interface for the hwsense daemon.
//!
//! Provides the `org.hwsense.Monitor1` interface on the session or system bus.

mod interface;

pub use interface::run_dbus_server;
