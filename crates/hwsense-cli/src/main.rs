//! hwsense control tool
//!
//! CLI for controlling the hwsense daemon via D-Bus.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hwsense_client::{BusType, MonitorClient, Reading};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum CliBusType {
    /// Try session bus first, fall back to system bus
    #[default]
    Auto,
    /// Use session bus (for user services)
    Session,
    /// Use system bus (for system services)
    System,
}

impl From<CliBusType> for BusType {
    fn from(bus: CliBusType) -> Self {
        match bus {
            CliBusType::Auto => BusType::Auto,
            CliBusType::Session => BusType::Session,
            CliBusType::System => BusType::System,
        }
    }
}

#[derive(Parser)]
#[command(name = "hwsensectl")]
#[command(about = "Control tool for the hwsense sensor daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// D-Bus bus type to use
    #[arg(long, default_value = "auto", value_enum)]
    bus: CliBusType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring
    Start,
    /// Stop monitoring
    Stop,
    /// Collect a snapshot right now
    Refresh,
    /// Set or show the poll interval
    Interval {
        /// fast, normal, eco, slow (or 1, 2, 5, 10 seconds); omit to show current
        interval: Option<String>,
    },
    /// Print the current readings
    Readings {
        /// Sensor type to show (temperature, fan, voltage, clock, load, ...)
        #[arg(short, long, default_value = "all")]
        filter: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Reprint readings every time a new snapshot is published
    Watch {
        /// Sensor type to show
        #[arg(short, long, default_value = "all")]
        filter: String,
    },
    /// Show recent daemon events
    Events {
        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        count: u32,
    },
    /// Show monitoring status
    Status,
    /// Request daemon shutdown
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Connect to daemon
    let client = MonitorClient::connect_with_bus(cli.bus.into())
        .await
        .context("Failed to connect to daemon. Is hwsensed running?")?;

    match cli.command {
        Commands::Start => {
            if client.start().await? {
                println!("Monitoring started");
            } else {
                println!("Monitoring already running");
            }
        }
        Commands::Stop => {
            client.stop().await?;
            println!("Monitoring stopped");
        }
        Commands::Refresh => {
            let outcome = client.refresh_now().await?;
            println!("Refresh: {}", outcome);
        }
        Commands::Interval { interval } => handle_interval(interval, &client).await?,
        Commands::Readings { filter, json } => {
            if json {
                let readings = client.get_readings_json(&filter).await?;
                let value: serde_json::Value =
                    serde_json::from_str(&readings).context("Daemon returned invalid JSON")?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_readings(&client.get_readings(&filter).await?);
            }
        }
        Commands::Watch { filter } => watch(&filter, &client).await?,
        Commands::Events { count } => {
            let events = client.recent_events(count).await?;
            if events.is_empty() {
                println!("No events");
            }
            for event in events {
                println!("{} {:>7}  {}", event.timestamp, event.level, event.message);
            }
        }
        Commands::Status => {
            let running = client.is_running().await?;
            let interval = client.get_interval().await?;
            let sequence = client.snapshot_sequence().await?;
            let count = client.reading_count().await?;
            println!("Monitor Status:");
            println!("  State: {}", if running { "running" } else { "stopped" });
            println!("  Interval: {}", interval);
            println!("  Snapshot: #{} ({} readings)", sequence, count);
            if let Some(halt) = client.last_halt().await? {
                println!("  Last halt: {}", halt);
            }
        }
        Commands::Quit => {
            client.quit().await?;
            println!("Shutdown request sent to daemon");
        }
    }

    Ok(())
}

async fn handle_interval(interval: Option<String>, client: &MonitorClient) -> Result<()> {
    match interval {
        Some(interval) => {
            client.set_interval(&interval).await?;
            println!("Interval set to: {}", client.get_interval().await?);
        }
        None => {
            let current = client.get_interval().await?;
            let available = client.list_intervals().await?;
            println!("Current interval: {}", current);
            println!("Available: {}", available.join(", "));
        }
    }
    Ok(())
}

fn print_readings(readings: &[Reading]) {
    if readings.is_empty() {
        println!("No readings");
        return;
    }

    let hardware_width = readings.iter().map(|r| r.hardware_name.len()).max().unwrap_or(0);
    let sensor_width = readings.iter().map(|r| r.sensor_name.len()).max().unwrap_or(0);

    for r in readings {
        println!(
            "{:<hw$}  {:<sw$}  {:>10.2} {}",
            r.hardware_name,
            r.sensor_name,
            r.value,
            r.unit,
            hw = hardware_width,
            sw = sensor_width
        );
    }
}

/// Polls the snapshot sequence and reprints whenever it changes.
async fn watch(filter: &str, client: &MonitorClient) -> Result<()> {
    let mut last_sequence = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }

        let sequence = client.snapshot_sequence().await?;
        if last_sequence == Some(sequence) {
            continue;
        }
        last_sequence = Some(sequence);

        let readings = client.get_readings(filter).await?;
        println!("--- snapshot #{} ---", sequence);
        print_readings(&readings);
    }
}
