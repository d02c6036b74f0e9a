//! Synthetic Wand
//!
//! Streams a sine tone with sweeping orientation to a relay, paced slightly
//! faster than real time so the relay's queue never starves.
//!
//! Usage: wand-sim [tcp|udp] [target] [seconds]

use anyhow::{bail, Context, Result};
use std::f32::consts::PI;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wand_relay::{
    config::Transport,
    constants::*,
    protocol::{encode_datagram, encode_tcp_frame, Quaternion, Telemetry},
};

/// Packets go out at this fraction of their playback duration
const PACE: f64 = 0.95;
const AMPLITUDE: f32 = 10_000.0;
const PHASE_STEP: f32 = 0.2;

enum Link {
    Tcp(TcpStream),
    Udp(UdpSocket, SocketAddr),
}

impl Link {
    fn open(transport: Transport, target: SocketAddr) -> Result<Self> {
        Ok(match transport {
            Transport::Tcp => {
                let stream = TcpStream::connect(target).with_context(|| format!("Connecting to {}", target))?;
                stream.set_nodelay(true)?;
                Link::Tcp(stream)
            }
            Transport::Udp => {
                let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                Link::Udp(UdpSocket::bind(bind)?, target)
            }
        })
    }

    fn send(&mut self, seq_num: u8, telemetry: &Telemetry, audio: &[i16]) -> Result<()> {
        match self {
            Link::Tcp(stream) => stream.write_all(&encode_tcp_frame(telemetry, audio))?,
            Link::Udp(socket, target) => {
                socket.send_to(&encode_datagram(seq_num, telemetry, audio), *target)?;
            }
        }
        Ok(())
    }
}

/// Orientation after `t` seconds: one turn about the vertical axis every 4 s
fn sweep(t: f32) -> Quaternion {
    let half_angle = PI * t / 4.0;
    Quaternion::new(half_angle.cos(), 0.0, 0.0, half_angle.sin())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let transport = match args.next().as_deref() {
        None | Some("tcp") => Transport::Tcp,
        Some("udp") => Transport::Udp,
        Some(other) => bail!("Unknown transport: {} (expected tcp or udp)", other),
    };
    let target: SocketAddr = args
        .next()
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT))
        .parse()
        .context("Invalid target address")?;
    let seconds: f64 = match args.next() {
        Some(s) => s.parse().with_context(|| format!("Invalid duration: {}", s))?,
        None => 10.0,
    };

    let mut link = Link::open(transport, target)?;
    tracing::info!("Streaming to {} over {} for {:.1}s", target, transport, seconds);

    let interval = Duration::from_secs_f64(DEFAULT_AUDIO_SAMPLES as f64 / DEFAULT_SAMPLE_RATE as f64 * PACE);
    let started = Instant::now();
    let mut next_send = started;
    let mut sample_index: u64 = 0;
    let mut seq_num: u8 = 0;
    let mut packets: u64 = 0;

    while started.elapsed().as_secs_f64() < seconds {
        let audio: Vec<i16> = (0..DEFAULT_AUDIO_SAMPLES as u64)
            .map(|i| (AMPLITUDE * (PHASE_STEP * (sample_index + i) as f32).sin()) as i16)
            .collect();
        sample_index += DEFAULT_AUDIO_SAMPLES as u64;

        let elapsed = started.elapsed().as_secs_f32();
        let telemetry = Telemetry {
            plugged_in: false,
            charged: false,
            battery_volts: 3.7 - 0.01 * elapsed.min(50.0),
            button: (elapsed as u64) % 2 == 1,
            quaternion: sweep(elapsed),
        };

        link.send(seq_num, &telemetry, &audio)?;
        seq_num = seq_num.wrapping_add(1);
        packets += 1;

        next_send += interval;
        if let Some(wait) = next_send.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    tracing::info!("Sent {} packets", packets);
    Ok(())
}
