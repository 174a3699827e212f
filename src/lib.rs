//! # Lipsync Streamer
//!
//! Low-latency talking-avatar playback driven by a remote lip-sync service.
//!
//! Voice audio produced upstream is pushed to the service over a binary
//! WebSocket; the service streams back multiplexed messages carrying one
//! video frame and one audio slice each. This crate decodes that stream,
//! groups it into fixed-size playback chunks, and plays the chunks back with
//! video and audio phase-locked.
//!
//! ## Architecture Overview
//!
//! ```text
//!                         wss://.../LipsyncStream
//!                                   │
//!                                   ▼
//!  ┌────────────────────────────────────────────────────────────────┐
//!  │                LipsyncTransport (network::ws)                  │
//!  │   session token out first, then: binary frames in / audio out  │
//!  └────────────────────────────────┬───────────────────────────────┘
//!                                   │ inbound messages, arrival order
//!                                   ▼
//!  ┌────────────────────────────────────────────────────────────────┐
//!  │                  Frame codec (codec::frame)                    │
//!  │        [VIDEO|end|idx|w|h|pixels][AUDIO|len|pcm16le]           │
//!  └────────────────────────────────┬───────────────────────────────┘
//!                                   │ DecodedMessage
//!                                   ▼
//!  ┌────────────────────────────────────────────────────────────────┐
//!  │             ChunkAccumulator (media::accumulator)              │
//!  │   one boundary counter, both media types, finalize at k msgs   │
//!  └────────────────────────────────┬───────────────────────────────┘
//!                                   │ MediaChunk (frames + audio, paired)
//!                                   ▼
//!  ┌────────────────────────────────────────────────────────────────┐
//!  │                   ChunkQueue (media::queue)                    │
//!  └────────────────────────────────┬───────────────────────────────┘
//!                                   │
//!                                   ▼
//!  ┌────────────────────────────────────────────────────────────────┐
//!  │           PlaybackScheduler (playback::scheduler)              │
//!  │     audio chunk → AudioSink, frames → VideoSink @ ~30 fps      │
//!  └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`session::FaceSession`] owns the whole pipeline for the lifetime of one
//! streaming session and tears it down atomically on close or transport
//! failure.

pub mod codec;
pub mod config;
pub mod error;
pub mod media;
pub mod network;
pub mod playback;
pub mod session;

pub use config::StreamConfig;
pub use error::{Error, Result};
pub use session::{CloseReason, FaceSession};

/// Application-wide constants
pub mod constants {
    /// Sample rate of the PCM16 audio carried by the lip-sync stream
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    /// The stream is mono
    pub const CHANNELS: u16 = 1;

    /// Nominal video frame rate of the stream
    pub const DEFAULT_FPS: u32 = 30;

    /// Interval between rendered video frames in milliseconds
    pub const FRAME_INTERVAL_MS: u64 = 33;

    /// Default number of inbound messages accumulated per playback chunk
    pub const DEFAULT_MIN_CHUNK_SIZE: usize = 15;

    /// Default bound on queued, not-yet-played chunks
    pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

    /// Default cap on in-progress chunk bytes (pixels + PCM)
    pub const DEFAULT_MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

    /// Consecutive decode failures tolerated before the stream is
    /// considered desynchronized
    pub const DEFAULT_MAX_DECODE_FAILURES: u32 = 8;

    /// Default transport inactivity timeout in seconds
    pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 60;
}
