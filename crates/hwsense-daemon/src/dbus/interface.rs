//! D-Bus interface implementation using zbus.
//!
//! Provides the `org.hwsense.Monitor1` interface.

use std::sync::Arc;

use hwsense_hw::{parse_filter, project, SensorReading};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{interface, Connection};

use crate::config::DbusBusType;
use crate::events::{EventBus, RecordedEvent};
use crate::interval::PollInterval;
use crate::monitor::{Monitor, MonitorError};

/// Well-known bus name.
pub const BUS_NAME: &str = "org.hwsense.Monitor";

/// Object path of the monitor.
pub const OBJECT_PATH: &str = "/org/hwsense/Monitor";

/// (timestamp, level, message) as served by `RecentEvents` and `Event`.
fn event_tuple(r: RecordedEvent) -> (String, String, String) {
    let message = match (&r.event.device, &r.event.sub_device) {
        (Some(device), Some(sub)) => format!("[{}/{}] {}", device, sub, r.event.message),
        (Some(device), None) => format!("[{}] {}", device, r.event.message),
        _ => r.event.message,
    };
    (r.at.to_rfc3339(), r.event.level.to_string(), message)
}

fn to_fdo(e: MonitorError) -> zbus::fdo::Error {
    match e {
        MonitorError::Access(e) => zbus::fdo::Error::AccessDenied(e.to_string()),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

/// D-Bus interface implementation for the hwsense monitor.
pub struct Monitor1Interface {
    monitor: Monitor,
    events: Arc<EventBus>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
}

impl Monitor1Interface {
    /// Creates a new D-Bus interface.
    pub fn new(monitor: Monitor, events: Arc<EventBus>, shutdown_tx: tokio::sync::mpsc::Sender<()>) -> Self {
        Self {
            monitor,
            events,
            shutdown_tx,
        }
    }

    fn readings(&self, filter: &str) -> zbus::fdo::Result<Vec<SensorReading>> {
        let category =
            parse_filter(filter).map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        let snapshot = self.monitor.snapshot();
        Ok(project(&snapshot, category).into_iter().cloned().collect())
    }
}

#[interface(name = "org.hwsense.Monitor1")]
impl Monitor1Interface {
    /// Starts monitoring. Returns false if it was already running.
    async fn start(&self) -> zbus::fdo::Result<bool> {
        let started = self.monitor.start().await.map_err(to_fdo)?.is_some();
        debug!("D-Bus: Start -> {}", started);
        Ok(started)
    }

    /// Stops monitoring.
    async fn stop(&self) -> zbus::fdo::Result<()> {
        self.monitor.stop().await.map_err(to_fdo)?;
        debug!("D-Bus: Stop");
        Ok(())
    }

    /// Collects immediately and returns how the cycle ended.
    async fn refresh_now(&self) -> zbus::fdo::Result<String> {
        let handle = self.monitor.refresh_now().await.map_err(to_fdo)?;
        let outcome = handle.outcome().await;
        debug!("D-Bus: RefreshNow -> {}", outcome.name());
        Ok(outcome.name().to_string())
    }

    /// Sets the poll interval (fast, normal, eco, slow or 1, 2, 5, 10).
    async fn set_interval(&self, interval: &str) -> zbus::fdo::Result<()> {
        let interval: PollInterval = interval.parse().map_err(zbus::fdo::Error::InvalidArgs)?;
        self.monitor.set_interval(interval).await.map_err(to_fdo)?;
        debug!("D-Bus: SetInterval({})", interval);
        Ok(())
    }

    /// Gets the current poll interval name.
    fn get_interval(&self) -> String {
        self.monitor.status().interval.to_string()
    }

    /// Lists the available poll interval names.
    fn list_intervals(&self) -> Vec<String> {
        PollInterval::ALL.iter().map(|i| i.to_string()).collect()
    }

    /// Returns the current readings as
    /// (hardware, hardware type, sensor, sensor type, value, unit).
    fn get_readings(
        &self,
        filter: &str,
    ) -> zbus::fdo::Result<Vec<(String, String, String, String, f64, String)>> {
        Ok(self
            .readings(filter)?
            .into_iter()
            .map(|r| {
                (
                    r.hardware_name,
                    r.hardware_type.to_string(),
                    r.sensor_name,
                    r.sensor_type.to_string(),
                    r.value,
                    r.unit.to_string(),
                )
            })
            .collect())
    }

    /// Returns the current readings as a JSON array.
    fn get_readings_json(&self, filter: &str) -> zbus::fdo::Result<String> {
        let readings = self.readings(filter)?;
        serde_json::to_string(&readings).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Returns up to `count` recent events as (timestamp, level, message).
    fn recent_events(&self, count: u32) -> Vec<(String, String, String)> {
        self.events
            .recent(count as usize)
            .into_iter()
            .map(event_tuple)
            .collect()
    }

    /// Shuts down the daemon.
    async fn quit(&self) -> zbus::fdo::Result<()> {
        info!("D-Bus: Quit requested");
        self.shutdown_tx
            .send(())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(())
    }

    /// Emitted for every monitor event, with the same fields as `RecentEvents`.
    #[zbus(signal)]
    async fn event(
        emitter: &SignalEmitter<'_>,
        timestamp: &str,
        level: &str,
        message: &str,
    ) -> zbus::Result<()>;

    // Properties

    /// Whether monitoring is running.
    #[zbus(property)]
    fn running(&self) -> bool {
        self.monitor.status().is_running()
    }

    /// Current poll interval name.
    #[zbus(property)]
    fn interval(&self) -> String {
        self.monitor.status().interval.to_string()
    }

    /// Sequence number of the current snapshot (changes on every publish).
    #[zbus(property)]
    fn snapshot_sequence(&self) -> u64 {
        self.monitor.snapshot().sequence()
    }

    /// Number of readings in the current snapshot.
    #[zbus(property)]
    fn reading_count(&self) -> u32 {
        self.monitor.snapshot().len() as u32
    }

    /// Reason of the last forced halt (empty if none).
    #[zbus(property)]
    fn last_halt(&self) -> String {
        self.monitor
            .status()
            .last_halt
            .map(|h| format!("{}: {}", h.at.to_rfc3339(), h.reason))
            .unwrap_or_default()
    }
}

/// Connects to the appropriate D-Bus bus based on configuration.
async fn connect_to_bus(bus_type: DbusBusType) -> anyhow::Result<(Connection, &'static str)> {
    match bus_type {
        DbusBusType::Session => {
            let conn = Connection::session()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to session bus: {}", e))?;
            Ok((conn, "session"))
        }
        DbusBusType::System => {
            let conn = Connection::system()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to system bus: {}", e))?;
            Ok((conn, "system"))
        }
        DbusBusType::Auto => {
            // Try session bus first, fall back to system bus
            match Connection::session().await {
                Ok(conn) => Ok((conn, "session")),
                Err(session_err) => {
                    warn!(
                        "Session bus unavailable ({}), trying system bus",
                        session_err
                    );
                    let conn = Connection::system().await.map_err(|system_err| {
                        anyhow::anyhow!(
                            "Failed to connect to any D-Bus: session={}, system={}",
                            session_err,
                            system_err
                        )
                    })?;
                    Ok((conn, "system"))
                }
            }
        }
    }
}

/// Pushes snapshot, status and event changes to D-Bus clients until the
/// monitor goes away.
///
/// Property proxies cache values and only refresh on `PropertiesChanged`, so
/// every published snapshot or status has to be announced here.
async fn forward_changes(
    connection: Connection,
    monitor: Monitor,
    events: Arc<EventBus>,
) -> zbus::Result<()> {
    let iface_ref = connection
        .object_server()
        .interface::<_, Monitor1Interface>(OBJECT_PATH)
        .await?;
    let emitter = iface_ref.signal_emitter();

    let mut snapshots = monitor.subscribe();
    let mut status = monitor.watch_status();
    let mut events = events.subscribe();
    drop(monitor);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let iface = iface_ref.get().await;
                iface.snapshot_sequence_changed(emitter).await?;
                iface.reading_count_changed(emitter).await?;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let iface = iface_ref.get().await;
                iface.running_changed(emitter).await?;
                iface.interval_changed(emitter).await?;
                iface.last_halt_changed(emitter).await?;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let (timestamp, level, message) = event_tuple(event);
                    Monitor1Interface::event(emitter, &timestamp, &level, &message).await?;
                }
                Err(RecvError::Lagged(missed)) => debug!("Dropped {} events for D-Bus", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

fn spawn_forwarder(connection: &Connection, monitor: Monitor, events: Arc<EventBus>) {
    let connection = connection.clone();
    tokio::spawn(async move {
        if let Err(e) = forward_changes(connection, monitor, events).await {
            warn!("Stopped forwarding changes to D-Bus: {}", e);
        }
    });
}

/// Runs the D-Bus server.
pub async fn run_dbus_server(
    monitor: Monitor,
    events: Arc<EventBus>,
    shutdown_tx: tokio::sync::mpsc::Sender<()>,
    bus_type: DbusBusType,
) -> anyhow::Result<Connection> {
    let interface = Monitor1Interface::new(monitor.clone(), events.clone(), shutdown_tx);

    let (connection, bus_name) = connect_to_bus(bus_type).await?;

    connection
        .object_server()
        .at(OBJECT_PATH, interface)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register object: {}", e))?;

    connection
        .request_name(BUS_NAME)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to request bus name: {}", e))?;

    spawn_forwarder(&connection, monitor, events);

    info!("D-Bus service registered at {} on {} bus", BUS_NAME, bus_name);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{CycleOutcome, MonitorOptions};
    use hwsense_hw::fake::{FakeBackend, FakeDevice};
    use hwsense_hw::{DeviceSelection, HardwareSession, HardwareType, SensorType};

    async fn running_interface() -> Monitor1Interface {
        let backend = FakeBackend::new().with_device(
            FakeDevice::new("CPU", HardwareType::Cpu)
                .with_sensor("Tctl", SensorType::Temperature, Some(47.25))
                .with_sensor("Core #1", SensorType::Clock, Some(3900.0)),
        );
        let events = Arc::new(EventBus::new(16));
        let session = HardwareSession::new(Box::new(backend), DeviceSelection::default());
        let monitor = Monitor::spawn(session, MonitorOptions::default(), events.clone());

        let handle = monitor.start().await.unwrap().unwrap();
        assert!(matches!(handle.outcome().await, CycleOutcome::Applied(_)));

        let (shutdown_tx, _shutdown_rx) = tokio::sync::mpsc::channel(1);
        Monitor1Interface::new(monitor, events, shutdown_tx)
    }

    #[tokio::test]
    async fn test_get_readings_filtered() {
        let iface = running_interface().await;

        let all = iface.get_readings("all").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all[0],
            (
                "CPU".to_string(),
                "cpu".to_string(),
                "Tctl".to_string(),
                "temperature".to_string(),
                47.25,
                "°C".to_string()
            )
        );

        let clocks = iface.get_readings("clock").unwrap();
        assert_eq!(clocks.len(), 1);
        assert_eq!(clocks[0].5, "MHz");

        assert!(iface.get_readings("bogus").is_err());
    }

    #[tokio::test]
    async fn test_get_readings_json() {
        let iface = running_interface().await;
        let json: serde_json::Value = serde_json::from_str(&iface.get_readings_json("temperature").unwrap()).unwrap();
        assert_eq!(json[0]["sensor_name"], "Tctl");
        assert_eq!(json[0]["hardware_type"], "cpu");
        assert_eq!(json[0]["unit"], "°C");
    }

    #[tokio::test]
    async fn test_recent_events_and_properties() {
        let iface = running_interface().await;
        assert!(iface.running());
        assert_eq!(iface.snapshot_sequence(), 1);
        assert_eq!(iface.reading_count(), 2);
        assert_eq!(iface.last_halt(), "");

        let events = iface.recent_events(10);
        assert!(events.iter().any(|(_, level, msg)| level == "info" && msg.contains("Monitoring started")));

        assert!(iface.set_interval("turbo").await.is_err());
        iface.set_interval("eco").await.unwrap();
        assert_eq!(iface.get_interval(), "eco");
        assert_eq!(iface.list_intervals(), vec!["fast", "normal", "eco", "slow"]);

        iface.stop().await.unwrap();
        assert!(!iface.running());
        assert_eq!(iface.reading_count(), 0);
        assert_eq!(iface.refresh_now().await.unwrap(), "not-running");
    }

    #[zbus::proxy(
        interface = "org.hwsense.Monitor1",
        default_service = "org.hwsense.Monitor",
        default_path = "/org/hwsense/Monitor"
    )]
    trait Monitor1 {
        fn refresh_now(&self) -> zbus::Result<String>;

        fn stop(&self) -> zbus::Result<()>;

        #[zbus(property)]
        fn snapshot_sequence(&self) -> zbus::Result<u64>;

        #[zbus(property)]
        fn running(&self) -> zbus::Result<bool>;
    }

    /// Serves the interface on one end of a socket pair with changes forwarded,
    /// and returns a client proxy on the other end.
    async fn peer_proxy(iface: Monitor1Interface) -> (Connection, Monitor1Proxy<'static>) {
        let monitor = iface.monitor.clone();
        let events = iface.events.clone();

        let (server_end, client_end) = tokio::net::UnixStream::pair().unwrap();
        let server = zbus::connection::Builder::unix_stream(server_end)
            .server(zbus::Guid::generate())
            .unwrap()
            .p2p()
            .serve_at(OBJECT_PATH, iface)
            .unwrap()
            .build();
        let client = zbus::connection::Builder::unix_stream(client_end).p2p().build();
        let (server, client) = tokio::try_join!(server, client).unwrap();

        spawn_forwarder(&server, monitor, events);
        let proxy = Monitor1Proxy::new(&client).await.unwrap();
        (server, proxy)
    }

    async fn wait_for<T, F, Fut>(mut read: F, expected: T)
    where
        T: PartialEq + std::fmt::Debug,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = zbus::Result<T>>,
    {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let value = read().await.unwrap();
            if value == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "still {:?}, expected {:?}",
                value,
                expected
            );
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_clients_see_property_changes() {
        let (_server, proxy) = peer_proxy(running_interface().await).await;

        assert_eq!(proxy.snapshot_sequence().await.unwrap(), 1);
        assert!(proxy.running().await.unwrap());

        assert_eq!(proxy.refresh_now().await.unwrap(), "applied");
        wait_for(|| proxy.snapshot_sequence(), 2).await;

        proxy.stop().await.unwrap();
        wait_for(|| proxy.running(), false).await;
        wait_for(|| proxy.snapshot_sequence(), 3).await;
    }
}
