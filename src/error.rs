//! Error types for the wand relay

use thiserror::Error;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Output closed")]
    Closed,
}

/// Wire protocol errors. All of them are recoverable: the offending frame is
/// discarded and the reader carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated header: {samples} samples")]
    TruncatedHeader { samples: usize },

    #[error("No sync marker within {bytes} bytes")]
    FrameTooLong { bytes: usize },

    #[error("Audio payload too short: {samples} samples (need {min})")]
    RuntPayload { samples: usize, min: usize },

    #[error("Empty datagram")]
    EmptyDatagram,
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Accept failed: {0}")]
    AcceptFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Thread spawn failed: {0}")]
    SpawnFailed(String),
}

/// Result type alias for the relay
pub type Result<T> = std::result::Result<T, Error>;
