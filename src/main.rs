use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use droidpulse::analyzer::Analyzer;
use droidpulse::config::Config;
use droidpulse::orchestrator::Scanner;
use droidpulse::simulate;
use droidpulse::transport::{AdbTransport, Transport};
use droidpulse::types::DeviceHandle;

#[derive(Parser)]
#[command(name = "droidpulse")]
#[command(about = "Health scanner for adb-attached Android devices")]
#[command(version)]
struct Args {
    /// Serial to scan; repeat for several. Defaults to every attached device
    #[arg(short, long = "device", value_name = "SERIAL")]
    devices: Vec<String>,

    /// Path to a JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pretty-print the report JSON
    #[arg(long)]
    pretty: bool,

    /// Scan a built-in simulated fleet instead of real devices
    #[arg(long)]
    simulate: bool,
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.log_format);
    tracing::info!(
        adb = %config.adb_path,
        ai = config.ai.is_configured(),
        concurrency = config.max_concurrent_scans,
        "droidpulse starting"
    );

    let (transport, attached): (Arc<dyn Transport>, Vec<DeviceHandle>) = if args.simulate {
        let fleet = simulate::demo_fleet();
        let handles = fleet.handles();
        let transport: Arc<dyn Transport> = Arc::new(fleet);
        (transport, handles)
    } else {
        let adb = AdbTransport::new(&config.adb_path);
        adb.ensure_available(config.command_timeout())
            .await
            .with_context(|| format!("adb is not usable at '{}'", config.adb_path))?;
        let handles = adb
            .list_devices(config.command_timeout())
            .await
            .context("listing attached devices")?;
        let transport: Arc<dyn Transport> = Arc::new(adb);
        (transport, handles)
    };

    let devices = select_devices(attached, &args.devices);
    if devices.is_empty() {
        bail!("no devices to scan");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finalizing partial reports");
                cancel.cancel();
            }
        });
    }

    let analyzer = Arc::new(Analyzer::from_config(&config));
    let scanner = Scanner::new(&config, transport, analyzer);
    let reports = scanner.scan(devices, cancel).await;

    let out = if args.pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };
    println!("{}", out);
    Ok(())
}

/// Requested serials keep their order. Serials not currently attached are
/// still scanned so they come back as unreachable reports.
fn select_devices(attached: Vec<DeviceHandle>, requested: &[String]) -> Vec<DeviceHandle> {
    if requested.is_empty() {
        return attached;
    }
    requested
        .iter()
        .map(|serial| {
            attached
                .iter()
                .find(|d| &d.serial == serial)
                .cloned()
                .unwrap_or_else(|| DeviceHandle::new(serial.clone(), serial.clone()))
        })
        .collect()
}
