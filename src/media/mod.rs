//! Media units flowing through the playback pipeline

pub mod accumulator;
pub mod queue;

pub use accumulator::ChunkAccumulator;
pub use queue::ChunkQueue;

use bytes::Bytes;

/// One decoded video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame index as declared on the wire
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Encoded pixel bytes; the format is opaque to this crate
    pub data: Bytes,
}

/// Ordered frames produced within one accumulation cycle
pub type FrameGroup = Vec<VideoFrame>;

/// Audio of one finalized chunk, decoded to normalized f32 samples
#[derive(Debug, Clone)]
pub struct DecodedAudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudioBuffer {
    /// Playback duration of this buffer
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// The paired playback unit: the frames and audio finalized in the same
/// accumulation cycle. Keeping both halves in one value is what guarantees
/// video and audio stay phase-locked index-for-index.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub frames: FrameGroup,
    pub audio: DecodedAudioBuffer,
}
