//! D-Bus client library for communicating with the hwsense daemon.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zbus::{proxy, Connection};

/// Well-known bus name of the daemon.
pub const SERVICE_NAME: &str = "org.hwsense.Monitor";

/// D-Bus bus type selection.
#[derive(Debug, Clone, Copy, Default)]
pub enum BusType {
    /// Session bus (user session).
    Session,
    /// System bus (system-wide).
    System,
    /// Try session first, fall back to system.
    #[default]
    Auto,
}

/// D-Bus proxy for the hwsense monitor.
#[proxy(
    interface = "org.hwsense.Monitor1",
    default_service = "org.hwsense.Monitor",
    default_path = "/org/hwsense/Monitor"
)]
trait Monitor1 {
    /// Starts monitoring. Returns false if it was already running.
    fn start(&self) -> zbus::Result<bool>;

    /// Stops monitoring.
    fn stop(&self) -> zbus::Result<()>;

    /// Collects immediately and returns the cycle outcome name.
    fn refresh_now(&self) -> zbus::Result<String>;

    /// Sets the poll interval.
    fn set_interval(&self, interval: &str) -> zbus::Result<()>;

    /// Gets the poll interval name.
    fn get_interval(&self) -> zbus::Result<String>;

    /// Lists the poll interval names.
    fn list_intervals(&self) -> zbus::Result<Vec<String>>;

    /// Returns (hardware, hardware type, sensor, sensor type, value, unit).
    fn get_readings(
        &self,
        filter: &str,
    ) -> zbus::Result<Vec<(String, String, String, String, f64, String)>>;

    /// Returns the readings as a JSON array.
    fn get_readings_json(&self, filter: &str) -> zbus::Result<String>;

    /// Returns recent (timestamp, level, message) events.
    fn recent_events(&self, count: u32) -> zbus::Result<Vec<(String, String, String)>>;

    /// Shuts down the daemon.
    fn quit(&self) -> zbus::Result<()>;

    /// Emitted for every daemon event.
    #[zbus(signal)]
    fn event(&self, timestamp: &str, level: &str, message: &str) -> zbus::Result<()>;

    /// Whether monitoring is running.
    #[zbus(property)]
    fn running(&self) -> zbus::Result<bool>;

    /// Current poll interval name.
    #[zbus(property)]
    fn interval(&self) -> zbus::Result<String>;

    /// Sequence number of the current snapshot.
    #[zbus(property)]
    fn snapshot_sequence(&self) -> zbus::Result<u64>;

    /// Number of readings in the current snapshot.
    #[zbus(property)]
    fn reading_count(&self) -> zbus::Result<u32>;

    /// Reason of the last forced halt (empty if none).
    #[zbus(property)]
    fn last_halt(&self) -> zbus::Result<String>;
}

/// One sensor reading as served by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub hardware_name: String,
    pub hardware_type: String,
    pub sensor_name: String,
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
}

impl From<(String, String, String, String, f64, String)> for Reading {
    fn from(
        (hardware_name, hardware_type, sensor_name, sensor_type, value, unit): (
            String,
            String,
            String,
            String,
            f64,
            String,
        ),
    ) -> Self {
        Self {
            hardware_name,
            hardware_type,
            sensor_name,
            sensor_type,
            value,
            unit,
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} [{}]: {:.2} {}",
            self.hardware_name, self.sensor_name, self.sensor_type, self.value, self.unit
        )
    }
}

/// A recorded daemon event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// D-Bus client wrapper for the daemon.
pub struct MonitorClient {
    proxy: Monitor1Proxy<'static>,
}

impl MonitorClient {
    /// Attempts to connect to the daemon via D-Bus with auto bus detection.
    ///
    /// Tries session bus first, falls back to system bus.
    pub async fn connect() -> Result<Self> {
        Self::connect_with_bus(BusType::Auto).await
    }

    /// Attempts to connect to the daemon via D-Bus with specified bus type.
    pub async fn connect_with_bus(bus_type: BusType) -> Result<Self> {
        let connection = match bus_type {
            BusType::Session => {
                debug!("Connecting to session bus");
                Connection::session()
                    .await
                    .context("Failed to connect to session bus")?
            }
            BusType::System => {
                debug!("Connecting to system bus");
                Connection::system()
                    .await
                    .context("Failed to connect to system bus")?
            }
            BusType::Auto => {
                // Try session bus first, but verify the service exists
                if let Ok(conn) = Connection::session().await {
                    debug!("Connected to session bus, checking for daemon service");
                    if Self::service_exists(&conn).await {
                        debug!("Found daemon on session bus");
                        conn
                    } else {
                        debug!("Daemon not on session bus, trying system bus");
                        let sys_conn = Connection::system()
                            .await
                            .context("Failed to connect to system bus")?;
                        if Self::service_exists(&sys_conn).await {
                            debug!("Found daemon on system bus");
                            sys_conn
                        } else {
                            anyhow::bail!("Daemon service not found on session or system bus. Is hwsensed running?")
                        }
                    }
                } else {
                    debug!("Session bus unavailable, trying system bus");
                    Connection::system()
                        .await
                        .context("Failed to connect to any D-Bus")?
                }
            }
        };

        let proxy = Monitor1Proxy::new(&connection)
            .await
            .context("Failed to create D-Bus proxy")?;

        Ok(Self { proxy })
    }

    /// Checks if the daemon service exists on the given connection.
    async fn service_exists(conn: &Connection) -> bool {
        use zbus::fdo::DBusProxy;
        let Ok(name) = zbus::names::BusName::try_from(SERVICE_NAME) else {
            return false;
        };
        if let Ok(dbus_proxy) = DBusProxy::new(conn).await {
            dbus_proxy.name_has_owner(name).await.unwrap_or(false)
        } else {
            false
        }
    }

    /// Starts monitoring. Returns false if it was already running.
    pub async fn start(&self) -> Result<bool> {
        self.proxy
            .start()
            .await
            .context("Failed to start monitoring via D-Bus")
    }

    /// Stops monitoring.
    pub async fn stop(&self) -> Result<()> {
        self.proxy
            .stop()
            .await
            .context("Failed to stop monitoring via D-Bus")
    }

    /// Collects immediately and returns the cycle outcome name.
    pub async fn refresh_now(&self) -> Result<String> {
        self.proxy
            .refresh_now()
            .await
            .context("Failed to refresh via D-Bus")
    }

    /// Sets the poll interval.
    pub async fn set_interval(&self, interval: &str) -> Result<()> {
        self.proxy
            .set_interval(interval)
            .await
            .context("Failed to set interval via D-Bus")
    }

    /// Gets the poll interval name.
    pub async fn get_interval(&self) -> Result<String> {
        self.proxy
            .get_interval()
            .await
            .context("Failed to get interval via D-Bus")
    }

    /// Lists the poll interval names.
    pub async fn list_intervals(&self) -> Result<Vec<String>> {
        self.proxy
            .list_intervals()
            .await
            .context("Failed to list intervals via D-Bus")
    }

    /// Gets the current readings, optionally filtered by sensor type.
    pub async fn get_readings(&self, filter: &str) -> Result<Vec<Reading>> {
        let readings = self
            .proxy
            .get_readings(filter)
            .await
            .context("Failed to get readings via D-Bus")?;
        Ok(readings.into_iter().map(Reading::from).collect())
    }

    /// Gets the current readings as a JSON array.
    pub async fn get_readings_json(&self, filter: &str) -> Result<String> {
        self.proxy
            .get_readings_json(filter)
            .await
            .context("Failed to get readings via D-Bus")
    }

    /// Gets up to `count` recent events, oldest first.
    pub async fn recent_events(&self, count: u32) -> Result<Vec<EventEntry>> {
        let events = self
            .proxy
            .recent_events(count)
            .await
            .context("Failed to get events via D-Bus")?;
        Ok(events
            .into_iter()
            .map(|(timestamp, level, message)| EventEntry {
                timestamp,
                level,
                message,
            })
            .collect())
    }

    /// Shuts down the daemon.
    pub async fn quit(&self) -> Result<()> {
        self.proxy
            .quit()
            .await
            .context("Failed to quit daemon via D-Bus")
    }

    /// Whether monitoring is running.
    pub async fn is_running(&self) -> Result<bool> {
        self.proxy
            .running()
            .await
            .context("Failed to get running state via D-Bus")
    }

    /// Sequence number of the current snapshot.
    pub async fn snapshot_sequence(&self) -> Result<u64> {
        self.proxy
            .snapshot_sequence()
            .await
            .context("Failed to get snapshot sequence via D-Bus")
    }

    /// Number of readings in the current snapshot.
    pub async fn reading_count(&self) -> Result<u32> {
        self.proxy
            .reading_count()
            .await
            .context("Failed to get reading count via D-Bus")
    }

    /// Reason of the last forced halt, if any.
    pub async fn last_halt(&self) -> Result<Option<String>> {
        let halt = self
            .proxy
            .last_halt()
            .await
            .context("Failed to get last halt via D-Bus")?;
        Ok((!halt.is_empty()).then_some(halt))
    }
}
