//! hwsense daemon
//!
//! Background service that polls hardware sensors and serves the latest
//! snapshot over D-Bus.

mod config;
mod dbus;
mod events;
mod interval;
mod monitor;

use anyhow::{Context, Result};
use hwsense_hw::{HardwareSession, HwmonBackend};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use events::EventBus;
use monitor::{Monitor, MonitorOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        let config = Config::load(&config_path).context("Failed to load configuration")?;
        info!("Loaded configuration from: {}", config_path);
        config
    } else {
        warn!("Configuration file {} not found, using defaults", config_path);
        Config::default()
    };

    // Compose the monitor
    let events = Arc::new(EventBus::new(config.events.history));
    let backend = HwmonBackend::with_roots(&config.backend.sysfs_root, &config.backend.procfs_root);
    let session = HardwareSession::new(Box::new(backend), config.devices);
    let monitor = Monitor::spawn(
        session,
        MonitorOptions {
            interval: config.monitor.interval,
            collection_timeout: config.monitor.collection_timeout(),
        },
        events.clone(),
    );

    if config.monitor.autostart {
        // Failing to open the backend leaves the daemon up so that it can be
        // started again over D-Bus.
        if let Err(e) = monitor.start().await {
            error!("Failed to start monitoring: {}", e);
        }
    }

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Keep a clone of shutdown_tx to prevent the channel from closing if D-Bus fails
    let _shutdown_tx_keepalive = shutdown_tx.clone();

    // Start D-Bus service
    let _dbus_connection = match dbus::run_dbus_server(
        monitor.clone(),
        events.clone(),
        shutdown_tx,
        config.dbus.bus,
    )
    .await
    {
        Ok(conn) => {
            info!("D-Bus service started");
            Some(conn)
        }
        Err(e) => {
            warn!(
                "Failed to start D-Bus service: {}. Continuing without D-Bus.",
                e
            );
            None
        }
    };

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    // Wait for shutdown signal
    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("Shutdown requested via D-Bus");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    if let Err(e) = monitor.shutdown().await {
        warn!("Monitor shutdown failed: {}", e);
    }

    Ok(())
}
