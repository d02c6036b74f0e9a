//! Wand Relay Application
//!
//! Receives wand telemetry and audio over TCP or UDP, mixes every wand into
//! one output device and serves a JSON status API.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wand_relay::{
    audio::device::list_output_devices,
    config::{RelayConfig, Transport},
    ui::{AppState, WebServer},
    WandRelay,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    transport: Option<Transport>,
    port: Option<u16>,
    device: Option<usize>,
    no_http: bool,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--tcp" => args.transport = Some(Transport::Tcp),
            "--udp" => args.transport = Some(Transport::Udp),
            "--port" => {
                let port = iter.next().context("--port needs a value")?;
                args.port = Some(port.parse().with_context(|| format!("Invalid port: {}", port))?);
            }
            "--device" => {
                let device = iter.next().context("--device needs an index")?;
                args.device = Some(device.parse().with_context(|| format!("Invalid device index: {}", device))?);
            }
            "--no-http" => args.no_http = true,
            "--list-devices" => args.list_devices = true,
            "-h" | "--help" => {
                println!(
                    "Usage: wand-relay [--config FILE] [--tcp | --udp] [--port N] [--device N] [--no-http] [--list-devices]"
                );
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn print_devices() {
    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  [{}] {}{}", device.index, device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;
    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::load_default()?,
    };
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.device.is_some() {
        config.output_device = args.device;
    }
    if args.no_http {
        config.http.enabled = false;
    }

    tracing::info!("Starting Wand Relay");

    // Opening the device and binding sockets both block
    let relay = tokio::task::spawn_blocking(move || WandRelay::start(config)).await??;

    let web_handle = if relay.config().http.enabled {
        let server = WebServer::new(relay.config().http.clone(), AppState::from_relay(&relay));
        Some(server.start_background())
    } else {
        None
    };

    tracing::info!("Waiting for wands...");

    let mut stats_timer = tokio::time::interval(STATS_INTERVAL);
    stats_timer.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            _ = stats_timer.tick() => {
                let recv_stats = relay.receiver_stats();
                tracing::info!(
                    "Receiver stats: {} packets, {} bytes, {} invalid, {} stale, {} overflows",
                    recv_stats.packets_received,
                    recv_stats.bytes_received,
                    recv_stats.invalid_packets,
                    recv_stats.stale_packets,
                    recv_stats.overflows
                );

                if let Some(mixer) = relay.mixer_stats() {
                    tracing::info!(
                        "Mixer stats: {} ticks, {} samples written, {} write errors, {} output underruns",
                        mixer.ticks(),
                        mixer.samples_written(),
                        mixer.write_errors(),
                        mixer.output_underruns()
                    );
                }

                for status in relay.registry().statuses() {
                    tracing::info!(
                        "Wand {} ({:?}): queue {}{}, {} underruns, {} overflows ({:.1}% overflow)",
                        status.address,
                        status.lifecycle,
                        status.buffer.depth,
                        if status.buffer.buffering { " (buffering)" } else { "" },
                        status.buffer.underruns,
                        status.buffer.overflows,
                        status.buffer.overflow_rate() * 100.0
                    );
                }
            }
        }
    }

    if let Some(handle) = web_handle {
        handle.abort();
    }
    let mut relay = relay;
    tokio::task::spawn_blocking(move || relay.stop()).await?;

    Ok(())
}
