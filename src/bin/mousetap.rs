//! mousetap - poll USB HID mice and log their buttons and motion.

#![deny(clippy::unwrap_used)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mousetap::backends::usb::list_devices;
use mousetap::{Address, Logger, MonitorConfig, PortConfig, PortManager};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mousetap", version)]
#[command(about = "Poll USB HID mice over GET_REPORT and log their values")]
struct Cli {
    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached USB devices
    List,
    /// Poll one or more mice until interrupted
    Run {
        /// TOML file with one [[port]] table per device
        #[arg(long, conflicts_with_all = ["port", "vid", "pid"])]
        config: Option<PathBuf>,
        /// Port name
        #[arg(long, default_value = "mouse")]
        port: String,
        /// Vendor ID (hex, e.g. 0x03F0)
        #[arg(long, value_parser = parse_hex_u16)]
        vid: Option<u16>,
        /// Product ID (hex, e.g. 0x1198)
        #[arg(long, value_parser = parse_hex_u16)]
        pid: Option<u16>,
        /// Interface number
        #[arg(long, default_value_t = 0)]
        interface: u8,
        /// Poll interval in ms (0 = device interval)
        #[arg(long, default_value_t = 0)]
        interval: i64,
        /// Print a status report every N seconds (0 = never)
        #[arg(long, default_value_t = 5)]
        status_every: u64,
        /// Status report detail, 0..=4
        #[arg(long, default_value_t = 1)]
        detail: u8,
        /// Print status reports as JSON
        #[arg(long)]
        json: bool,
        /// Stop after N seconds (default: run until killed)
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mousetap={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    match cli.command {
        Commands::List => list(),
        Commands::Run {
            config,
            port,
            vid,
            pid,
            interface,
            interval,
            status_every,
            detail,
            json,
            duration,
        } => {
            let ports = match (config, vid, pid) {
                (Some(path), _, _) => MonitorConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?
                    .ports,
                (None, Some(vid), Some(pid)) => vec![PortConfig::new(port, vid, pid)
                    .interface(interface)
                    .poll_interval_ms(interval)],
                _ => bail!("either --config or both --vid and --pid are required"),
            };
            run(ports, status_every, detail, json, duration)
        }
    }
}

fn list() -> Result<()> {
    let devices = list_devices().context("enumerating USB devices")?;
    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }
    println!("{:<6} {:<8} {:<11} Class", "Bus", "Address", "ID");
    println!("{}", "-".repeat(36));
    for d in devices {
        println!(
            "{:<6} {:<8} {:04x}:{:04x}   {}",
            d.bus, d.address, d.vid, d.pid, d.class
        );
    }
    Ok(())
}

fn run(
    ports: Vec<PortConfig>,
    status_every: u64,
    detail: u8,
    json: bool,
    duration: Option<u64>,
) -> Result<()> {
    if ports.is_empty() {
        bail!("no ports configured");
    }

    let mut mgr = PortManager::new();
    for cfg in ports {
        let name = cfg.port.clone();
        mgr.configure(cfg)
            .with_context(|| format!("configuring port {name:?}"))?;
        for address in Address::DEFAULT_SET {
            mgr.register_callback(&name, address, Logger::new(name.as_str()))?;
        }
    }

    let started = Instant::now();
    let deadline = duration.map(Duration::from_secs);
    let tick = if status_every == 0 {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(status_every)
    };

    loop {
        std::thread::sleep(tick);
        if status_every > 0 {
            for snap in mgr.snapshots() {
                if json {
                    println!("{}", snap.to_json()?);
                } else {
                    print!("{}", mousetap::describe(&snap, detail));
                }
            }
        }
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
    }

    mgr.shutdown_all();
    Ok(())
}
