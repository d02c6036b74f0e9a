//! Relay configuration
//!
//! Loaded from TOML. Every field has a default so a partial file (or no file
//! at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::frame::TCP_HEADER_LEN;

/// Transport the wands connect over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Stream transport, frames terminated by the sync marker
    #[default]
    Tcp,
    /// One frame per datagram, led by a sequence number
    Udp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp => write!(f, "tcp"),
            Transport::Udp => write!(f, "udp"),
        }
    }
}

/// Status API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub transport: Transport,
    pub bind_address: String,
    pub port: u16,
    /// Index into the host's output devices; `None` selects the default device
    pub output_device: Option<usize>,
    /// Packets that must be queued before a buffering wand resumes
    pub buffer_limit: usize,
    /// Crossfade window in samples
    pub fade_length: usize,
    pub sample_rate: u32,
    /// Audio samples per packet the wands are expected to send
    pub audio_samples: usize,
    /// Hard ceiling on a wand's queue; beyond it the oldest packet is dropped
    pub max_queue_depth: usize,
    /// TCP only: samples buffered without a sync marker before resynchronising
    pub max_frame_samples: usize,
    /// Mixer back-off when no wand has audio ready
    pub idle_sleep_ms: u64,
    /// UDP only: requested socket receive buffer size
    pub recv_buffer_bytes: Option<usize>,
    pub http: HttpConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Tcp,
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            output_device: None,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            fade_length: DEFAULT_FADE_LENGTH,
            sample_rate: DEFAULT_SAMPLE_RATE,
            audio_samples: DEFAULT_AUDIO_SAMPLES,
            max_queue_depth: DEFAULT_BUFFER_LIMIT * 4,
            max_frame_samples: DEFAULT_MAX_FRAME_SAMPLES,
            idle_sleep_ms: 1,
            recv_buffer_bytes: Some(1 << 20),
            http: HttpConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load `relay.toml` from the platform config directory if present,
    /// defaults otherwise.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "wand-relay")
            .map(|dirs| dirs.config_dir().join("relay.toml"))
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject settings the mixer cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.fade_length == 0 {
            return Err(Error::Config("fade_length must be at least 1".into()));
        }
        if self.buffer_limit == 0 {
            return Err(Error::Config("buffer_limit must be at least 1".into()));
        }
        if self.audio_samples < 2 * self.fade_length {
            return Err(Error::Config(format!(
                "audio_samples ({}) must be at least twice fade_length ({})",
                self.audio_samples, self.fade_length
            )));
        }
        if self.max_queue_depth <= self.buffer_limit {
            return Err(Error::Config(format!(
                "max_queue_depth ({}) must exceed buffer_limit ({})",
                self.max_queue_depth, self.buffer_limit
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".into()));
        }
        // Header, one full payload and the marker must fit under the cap
        let smallest_frame = TCP_HEADER_LEN + self.audio_samples + 2;
        if self.max_frame_samples < smallest_frame {
            return Err(Error::Config(format!(
                "max_frame_samples ({}) must hold a whole frame of {} samples",
                self.max_frame_samples, smallest_frame
            )));
        }
        Ok(())
    }

    /// Smallest audio payload that can be crossfaded
    pub fn min_audio_samples(&self) -> usize {
        2 * self.fade_length
    }

    /// Listening address for the selected transport
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 5005);
        assert_eq!(config.buffer_limit, 10);
        assert_eq!(config.fade_length, 6);
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.transport, Transport::Tcp);
    }

    #[test]
    fn test_partial_toml() {
        let config = RelayConfig::from_toml(
            r#"
            transport = "udp"
            port = 6000
            output_device = 3

            [http]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.transport, Transport::Udp);
        assert_eq!(config.port, 6000);
        assert_eq!(config.output_device, Some(3));
        assert!(!config.http.enabled);
        assert_eq!(config.fade_length, DEFAULT_FADE_LENGTH);
    }

    #[test]
    fn test_rejects_short_packets() {
        let mut config = RelayConfig::default();
        config.audio_samples = 10;
        config.fade_length = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_queue_ceiling_below_limit() {
        let mut config = RelayConfig::default();
        config.max_queue_depth = config.buffer_limit;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_frame_cap_below_one_frame() {
        let mut config = RelayConfig::default();
        config.max_frame_samples = 0;
        assert!(config.validate().is_err());

        config.max_frame_samples = TCP_HEADER_LEN + config.audio_samples + 1;
        assert!(config.validate().is_err());

        config.max_frame_samples = TCP_HEADER_LEN + config.audio_samples + 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = RelayConfig::default();
        config.transport = Transport::Udp;
        config.audio_samples = 320;
        let text = config.to_toml().unwrap();
        let parsed = RelayConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.transport, Transport::Udp);
        assert_eq!(parsed.audio_samples, 320);
    }
}
