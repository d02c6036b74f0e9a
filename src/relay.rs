//! Relay assembly
//!
//! Wires a transport, the telemetry store, the client registry and the mixer
//! together. Shutdown runs in a fixed order: readers first, then the mixer,
//! whose thread closes the audio sink after its last write.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::mixer::{Mixer, MixerStats};
use crate::audio::output::{AudioSink, CpalOutput};
use crate::clients::{BufferSettings, ClientRegistry};
use crate::config::{RelayConfig, Transport};
use crate::error::Result;
use crate::network::socket::resolve;
use crate::network::{PacketRouter, ReceiverStatsSnapshot, TcpReceiver, UdpReceiver};
use crate::telemetry::TelemetryStore;

enum TransportHandle {
    Tcp(TcpReceiver),
    Udp(UdpReceiver),
}

impl TransportHandle {
    fn local_addr(&self) -> SocketAddr {
        match self {
            TransportHandle::Tcp(receiver) => receiver.local_addr(),
            TransportHandle::Udp(receiver) => receiver.local_addr(),
        }
    }

    fn stop(&mut self) {
        match self {
            TransportHandle::Tcp(receiver) => receiver.stop(),
            TransportHandle::Udp(receiver) => receiver.stop(),
        }
    }
}

/// A running relay
pub struct WandRelay {
    config: RelayConfig,
    telemetry: Arc<TelemetryStore>,
    registry: Arc<ClientRegistry>,
    router: Arc<PacketRouter>,
    transport: Option<TransportHandle>,
    mixer: Option<Mixer>,
    started_at: Instant,
}

impl WandRelay {
    /// Start with the configured output device. If the device cannot be
    /// opened the relay still runs, without audio output.
    pub fn start(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let sink: Option<Box<dyn AudioSink>> = match CpalOutput::open(config.output_device, config.sample_rate) {
            Ok(output) => {
                tracing::info!("Audio output: {}", output.device_name());
                Some(Box::new(output))
            }
            Err(e) => {
                tracing::warn!("Audio output unavailable, running without output: {}", e);
                None
            }
        };
        Self::start_with_sink(config, sink)
    }

    /// Start with an explicit sink (or none)
    pub fn start_with_sink(config: RelayConfig, sink: Option<Box<dyn AudioSink>>) -> Result<Self> {
        config.validate()?;

        let telemetry = Arc::new(TelemetryStore::new());
        let registry = Arc::new(ClientRegistry::new(BufferSettings::from(&config)));
        let router = Arc::new(
            PacketRouter::new(telemetry.clone(), registry.clone(), config.min_audio_samples())
                .with_expected_samples(config.audio_samples),
        );

        let mixer = Mixer::start(
            registry.clone(),
            sink,
            Duration::from_millis(config.idle_sleep_ms),
        )?;

        let addr = resolve(&config.listen_addr())?;
        let transport = match config.transport {
            Transport::Tcp => TransportHandle::Tcp(TcpReceiver::start(addr, router.clone(), config.max_frame_samples)?),
            Transport::Udp => TransportHandle::Udp(UdpReceiver::start(addr, router.clone(), config.recv_buffer_bytes)?),
        };

        tracing::info!(
            "Wand relay started: {} on {}, buffer limit {}, fade {} samples",
            config.transport,
            transport.local_addr(),
            config.buffer_limit,
            config.fade_length
        );

        Ok(Self {
            config,
            telemetry,
            registry,
            router,
            transport: Some(transport),
            mixer: Some(mixer),
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<TelemetryStore> {
        self.telemetry.clone()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    /// Bound address (resolves an ephemeral port)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(TransportHandle::local_addr)
    }

    pub fn router(&self) -> Arc<PacketRouter> {
        self.router.clone()
    }

    pub fn receiver_stats(&self) -> ReceiverStatsSnapshot {
        self.router.stats().snapshot()
    }

    pub fn mixer_stats(&self) -> Option<Arc<MixerStats>> {
        self.mixer.as_ref().map(Mixer::stats)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop readers, then the mixer. Returns once every thread has exited and
    /// the audio sink is closed.
    pub fn stop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.stop();
        }
        if let Some(mut mixer) = self.mixer.take() {
            mixer.stop();
        }
    }
}

impl Drop for WandRelay {
    fn drop(&mut self) {
        self.stop();
    }
}
