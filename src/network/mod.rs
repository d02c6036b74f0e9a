//! Network transports
//!
//! Both transports feed decoded frames through a [`PacketRouter`], which
//! applies telemetry and hands audio to the wand's jitter buffer.

pub mod socket;
pub mod tcp;
pub mod udp;

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::PushOutcome;
use crate::clients::ClientRegistry;
use crate::error::ProtocolError;
use crate::protocol::frame::{decode_datagram, decode_tcp_frame, DecodedFrame};
use crate::telemetry::{SequenceVerdict, TelemetryStore};

pub use socket::{create_listener, create_socket};
pub use tcp::TcpReceiver;
pub use udp::UdpReceiver;

/// What became of a routed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Telemetry applied and audio queued
    Queued,
    /// UDP duplicate or late datagram, dropped whole
    Stale,
}

/// Receive-side counters shared by the transport threads
#[derive(Debug, Default)]
pub struct ReceiverStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    invalid_packets: AtomicU64,
    stale_packets: AtomicU64,
    overflows: AtomicU64,
    connections: AtomicU64,
}

impl ReceiverStats {
    pub fn add_bytes(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_invalid(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            stale_packets: self.stale_packets.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverStatsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub invalid_packets: u64,
    pub stale_packets: u64,
    pub overflows: u64,
    pub connections: u64,
}

/// Applies decoded frames to the telemetry store and client registry
pub struct PacketRouter {
    telemetry: Arc<TelemetryStore>,
    registry: Arc<ClientRegistry>,
    min_audio_samples: usize,
    /// Payload length wands are configured to send, if known
    expected_samples: Option<usize>,
    stats: ReceiverStats,
}

impl PacketRouter {
    pub fn new(telemetry: Arc<TelemetryStore>, registry: Arc<ClientRegistry>, min_audio_samples: usize) -> Self {
        Self {
            telemetry,
            registry,
            min_audio_samples,
            expected_samples: None,
            stats: ReceiverStats::default(),
        }
    }

    /// Log payloads whose length differs from `samples`. They are still mixed.
    pub fn with_expected_samples(mut self, samples: usize) -> Self {
        self.expected_samples = Some(samples);
        self
    }

    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        &self.telemetry
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Register a newly connected TCP wand
    pub fn connect(&self, addr: SocketAddr) {
        self.stats.add_connection();
        self.telemetry.ensure(addr);
        self.registry.register(addr);
    }

    /// A TCP wand went away
    pub fn disconnect(&self, addr: SocketAddr) {
        self.registry.mark_closing(&addr);
    }

    /// Route one deframed TCP frame
    pub fn route_tcp_frame(&self, addr: SocketAddr, samples: &[i16]) -> Result<RouteOutcome, ProtocolError> {
        let frame = decode_tcp_frame(samples).map_err(|e| self.invalid(e))?;
        self.telemetry.update(addr, &frame.telemetry);
        self.queue_audio(addr, frame)
    }

    /// Route one UDP datagram. The first datagram from an address registers it.
    pub fn route_datagram(&self, addr: SocketAddr, bytes: &[u8]) -> Result<RouteOutcome, ProtocolError> {
        let frame = decode_datagram(bytes).map_err(|e| self.invalid(e))?;
        if self.registry.get(&addr).is_none() {
            tracing::info!("New wand at {}", addr);
            self.stats.add_connection();
            self.registry.register(addr);
        }

        let seq_num = frame.seq_num.unwrap_or_default();
        if self.telemetry.update_sequenced(addr, seq_num, &frame.telemetry) == SequenceVerdict::Stale {
            self.stats.stale_packets.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Dropped stale datagram {} from {}", seq_num, addr);
            return Ok(RouteOutcome::Stale);
        }
        self.queue_audio(addr, frame)
    }

    fn queue_audio(&self, addr: SocketAddr, frame: DecodedFrame) -> Result<RouteOutcome, ProtocolError> {
        tracing::trace!("Wand {}: {:?}", addr, frame.telemetry);

        if frame.audio.len() < self.min_audio_samples {
            return Err(self.invalid(ProtocolError::RuntPayload {
                samples: frame.audio.len(),
                min: self.min_audio_samples,
            }));
        }

        if let Some(expected) = self.expected_samples {
            if frame.audio.len() != expected {
                tracing::debug!(
                    "Wand {} sent {} audio samples, expected {}",
                    addr,
                    frame.audio.len(),
                    expected
                );
            }
        }

        self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
        if let Some(PushOutcome::Overflowed) = self.registry.enqueue(&addr, frame.audio) {
            self.stats.overflows.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Wand {} queue full, dropped oldest packet", addr);
        }
        Ok(RouteOutcome::Queued)
    }

    fn invalid(&self, error: ProtocolError) -> ProtocolError {
        self.stats.add_invalid();
        error
    }
}
