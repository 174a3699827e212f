//! Error types for the lip-sync streaming client

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoding errors for the multiplexed wire format and PCM payloads
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed frame: message of {len} bytes is shorter than the {min} byte header")]
    MessageTooShort { len: usize, min: usize },

    #[error("Malformed frame: video end offset {end_index} inconsistent with message of {len} bytes")]
    BadEndIndex { end_index: usize, len: usize },

    #[error("Malformed audio: PCM16 payload of {0} bytes has odd length")]
    OddPcmLength(usize),

    #[error("Chunk overflow: in-progress chunk exceeded {max} bytes")]
    ChunkOverflow { max: usize },
}

impl CodecError {
    /// Whether the error refers to the message framing rather than the
    /// audio payload.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            CodecError::MessageTooShort { .. } | CodecError::BadEndIndex { .. }
        )
    }
}

/// Transport (WebSocket) errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Connection closed by remote")]
    Closed,

    #[error("No inbound message within the inactivity timeout")]
    Timeout,
}

/// Audio/video output errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
