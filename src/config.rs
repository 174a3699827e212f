//! Session configuration
//!
//! Loaded from a TOML file or built in code; every field has a default so a
//! config file only needs to override what it changes.

use crate::constants;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one streaming session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket endpoint of the lip-sync service
    pub endpoint: String,

    /// Number of inbound messages accumulated into one playback chunk.
    /// Smaller values lower latency at the cost of more scheduling overhead;
    /// larger values smooth playback at the cost of delay.
    pub min_chunk_size: usize,

    /// Sample rate of the inbound PCM16 audio
    pub sample_rate: u32,

    /// Video frame rate used for the render cadence
    pub fps: u32,

    /// Bound on queued, not-yet-played chunks
    pub queue_capacity: usize,

    /// Cap on in-progress chunk bytes (pixels + PCM) per accumulation cycle
    pub max_chunk_bytes: usize,

    /// Consecutive decode failures tolerated before the session is torn
    /// down as desynchronized
    pub max_decode_failures: u32,

    /// Transport inactivity timeout in seconds
    pub inactivity_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.simli.ai/LipsyncStream".to_string(),
            min_chunk_size: constants::DEFAULT_MIN_CHUNK_SIZE,
            sample_rate: constants::DEFAULT_SAMPLE_RATE,
            fps: constants::DEFAULT_FPS,
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
            max_chunk_bytes: constants::DEFAULT_MAX_CHUNK_BYTES,
            max_decode_failures: constants::DEFAULT_MAX_DECODE_FAILURES,
            inactivity_timeout_secs: constants::DEFAULT_INACTIVITY_TIMEOUT_SECS,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: StreamConfig =
            toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<config dir>/lipsync-streamer/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lipsync-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default path, falling back to defaults when no file
    /// exists there.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_toml_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::Config("endpoint must not be empty".into()));
        }
        if self.min_chunk_size == 0 {
            return Err(Error::Config("min_chunk_size must be at least 1".into()));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".into()));
        }
        if self.fps == 0 {
            return Err(Error::Config("fps must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.max_chunk_bytes == 0 {
            return Err(Error::Config("max_chunk_bytes must be non-zero".into()));
        }
        Ok(())
    }

    /// Interval between rendered video frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.fps as u64)
    }

    /// Nominal playback duration of one chunk (`min_chunk_size` messages at
    /// one frame each)
    pub fn playback_delay(&self) -> Duration {
        Duration::from_millis(self.min_chunk_size as u64 * 1000 / self.fps as u64)
    }

    /// Polling interval while the scheduler is draining an empty queue
    pub fn drain_interval(&self) -> Duration {
        self.playback_delay() * 2
    }

    /// Transport inactivity timeout
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}
