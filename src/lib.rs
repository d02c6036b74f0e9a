//! # Wand Relay
//!
//! Real-time relay for handheld wand devices. Each wand streams a telemetry
//! header (charge state, battery, button, orientation quaternion) followed by
//! a block of 16 kHz PCM audio. The relay decodes the telemetry, keeps the
//! latest snapshot per wand and mixes every wand's audio into one output
//! stream without clicks at packet boundaries.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌─────────┐   ┌─────────┐   ┌─────────┐
//!  │ Wand A  │   │ Wand B  │   │ Wand C  │
//!  └────┬────┘   └────┬────┘   └────┬────┘
//!       │ TCP (sync-terminated) or UDP (sequence-numbered)
//!       ▼             ▼             ▼
//!  ┌─────────────────────────────────────────┐
//!  │ Transport (network::tcp / network::udp) │
//!  │  one reader thread per TCP connection,  │
//!  │  or one receiver thread for UDP         │
//!  └────────────────────┬────────────────────┘
//!                       │ raw bytes / datagrams
//!                       ▼
//!  ┌─────────────────────────────────────────┐
//!  │ Frame Parser (protocol)                 │
//!  │  deframing, header decode, staleness    │
//!  └──────────┬──────────────────┬───────────┘
//!             │ telemetry        │ audio packets
//!             ▼                  ▼
//!  ┌────────────────────┐ ┌──────────────────────────────┐
//!  │ TelemetryStore     │ │ ClientRegistry               │
//!  │  latest snapshot   │ │  per-wand JitterBuffer,      │
//!  │  per wand          │ │  lifecycle, crossfade tail   │
//!  └────────────────────┘ └──────────────┬───────────────┘
//!                                        │ one packet per ready wand per tick
//!                                        ▼
//!                         ┌──────────────────────────────┐
//!                         │ Mixer thread (audio::mixer)  │
//!                         │  crossfade, sum, clip        │
//!                         └──────────────┬───────────────┘
//!                                        ▼
//!                         ┌──────────────────────────────┐
//!                         │ AudioSink (cpal output)      │
//!                         └──────────────────────────────┘
//! ```

pub mod audio;
pub mod clients;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod relay;
pub mod telemetry;
pub mod ui;

pub use error::{Error, Result};
pub use relay::WandRelay;

/// Application-wide constants
pub mod constants {
    /// Output sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    /// Output is mono
    pub const OUTPUT_CHANNELS: u16 = 1;

    /// Default listening port for both transports
    pub const DEFAULT_PORT: u16 = 5005;

    /// Packets that must be queued before a buffering wand resumes
    pub const DEFAULT_BUFFER_LIMIT: usize = 10;

    /// Crossfade window in samples
    pub const DEFAULT_FADE_LENGTH: usize = 6;

    /// Audio samples carried by one packet
    pub const DEFAULT_AUDIO_SAMPLES: usize = 512;

    /// Upper bound on samples buffered while looking for a TCP sync marker
    pub const DEFAULT_MAX_FRAME_SAMPLES: usize = 16_384;

    /// Default HTTP status API port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Largest datagram accepted by the UDP receiver
    pub const MAX_DATAGRAM_SIZE: usize = 4096;

    /// Size of a read from a TCP connection
    pub const TCP_READ_SIZE: usize = 4096;
}
