//! Muster daemon - main entry point
//!
//! Tracks a fleet of adb-over-TCP devices: scans the local subnet, keeps
//! the registry synchronized with the bridge, and dispatches commands.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use muster_adb::{spawn_tracker, AdbTransport};
use muster_core::{EventKind, FleetEvent, Serial};
use muster_session::{FleetSession, Operation};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "muster")]
#[command(about = "Fleet session engine for adb devices on the local network")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "muster.toml")]
    config: PathBuf,

    /// Path to the adb binary
    #[arg(long)]
    adb_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run a single subnet scan and print the resulting fleet
    Scan,
    /// Watch the fleet, logging every change until interrupted
    Watch,
    /// Dispatch an operation across the online fleet
    Dispatch {
        /// Operation: reboot, layout-bounds, force-stop, uninstall
        operation: String,
        /// Application or package identifier, where the operation needs one
        #[arg(long)]
        target: Option<String>,
        /// Restrict to these serials; empty means the whole fleet
        #[arg(long)]
        serial: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Muster v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(adb_path) = args.adb_path {
        config.adb.path = adb_path;
    }

    let transport = Arc::new(AdbTransport::new(config.to_adb_config()));
    let session = FleetSession::with_scan_config(Arc::clone(&transport), config.to_scan_config());

    let pump = session.spawn_event_pump();
    let tracker = spawn_tracker(
        Arc::clone(&transport),
        Duration::from_secs(config.adb.poll_interval_secs),
    );

    match args.command {
        Command::Scan => {
            info!("Running single discovery scan");
            session.scan_once().await;
            let devices = session.snapshot();
            println!("Fleet ({} devices):", devices.len());
            for device in devices {
                println!(
                    "  - {} ({}) at {} [{:?}]",
                    device.display_name, device.serial, device.address, device.state
                );
            }
        }
        Command::Watch => {
            session.subscribe(EventKind::DevicesUpdate, |event| {
                if let FleetEvent::DevicesUpdate(snapshot) = event {
                    match serde_json::to_string(snapshot) {
                        Ok(json) => println!("{}", json),
                        Err(e) => info!(error = %e, "Snapshot serialization failed"),
                    }
                }
            });
            session.subscribe(EventKind::Error, |event| {
                if let FleetEvent::Error(message) = event {
                    eprintln!("error: {}", message);
                }
            });
            session.subscribe(EventKind::ScanComplete, |_| {
                info!("Scan complete");
            });

            session.start_scan();
            info!("Watching fleet, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            session.disconnect_all().await;
        }
        Command::Dispatch {
            operation,
            target,
            serial,
        } => {
            let operation = parse_operation(&operation, target)?;
            session.scan_once().await;

            let serials: Vec<Serial> = serial.into_iter().map(Serial::new).collect();
            let outcome = session.dispatch(&operation, &serials).await;
            println!("{}", outcome.summary(&operation));
        }
    }

    tracker.abort();
    pump.abort();
    Ok(())
}

fn parse_operation(name: &str, target: Option<String>) -> Result<Operation> {
    match name {
        "reboot" => Ok(Operation::Reboot),
        "layout-bounds" => Ok(Operation::ToggleLayoutBounds),
        "force-stop" => {
            let app_id =
                target.ok_or_else(|| anyhow::anyhow!("force-stop requires --target <app-id>"))?;
            Ok(Operation::ForceStop { app_id })
        }
        "uninstall" => {
            let package =
                target.ok_or_else(|| anyhow::anyhow!("uninstall requires --target <package>"))?;
            Ok(Operation::Uninstall { package })
        }
        other => anyhow::bail!("unknown operation: {}", other),
    }
}
