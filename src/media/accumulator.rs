//! Chunk accumulation
//!
//! Groups consecutive decoded messages into fixed-size playback chunks. One
//! accumulator handles both media types of a message, so the chunk-boundary
//! counter is incremented exactly once per message and a finalized chunk
//! always carries the frames and audio of the same cycle.

use crate::codec::{pcm, DecodedMessage};
use crate::error::CodecError;
use crate::media::{DecodedAudioBuffer, MediaChunk, VideoFrame};
use bytes::{BufMut, BytesMut};
use tracing::debug;

/// Accumulates decoded messages into [`MediaChunk`]s of `min_chunk_size`
/// messages each.
pub struct ChunkAccumulator {
    min_chunk_size: usize,
    sample_rate: u32,
    max_chunk_bytes: usize,

    /// Frames of the in-progress cycle
    frames: Vec<VideoFrame>,
    /// Undecoded PCM16 bytes of the in-progress cycle
    pcm: BytesMut,
    /// Messages received since the last chunk boundary
    cycle_len: usize,
    /// Pixel + PCM bytes of the in-progress cycle
    cycle_bytes: usize,

    /// Chunks finalized over the session
    chunks_finalized: u64,
    /// Cycles dropped (bad audio or overflow)
    cycles_dropped: u64,
}

impl ChunkAccumulator {
    pub fn new(min_chunk_size: usize, sample_rate: u32, max_chunk_bytes: usize) -> Self {
        Self {
            min_chunk_size,
            sample_rate,
            max_chunk_bytes,
            frames: Vec::with_capacity(min_chunk_size),
            pcm: BytesMut::new(),
            cycle_len: 0,
            cycle_bytes: 0,
            chunks_finalized: 0,
            cycles_dropped: 0,
        }
    }

    /// Feed one decoded message.
    ///
    /// Returns `Ok(Some(chunk))` when this message completed a cycle,
    /// `Ok(None)` while the cycle is still filling. On error the in-progress
    /// cycle has been dropped and the accumulator is ready for the next
    /// message; the session decides whether to keep going.
    pub fn push(&mut self, message: DecodedMessage) -> Result<Option<MediaChunk>, CodecError> {
        self.cycle_bytes += message.video.data.len() + message.audio.len();
        if self.cycle_bytes > self.max_chunk_bytes {
            let max = self.max_chunk_bytes;
            self.reset_cycle();
            self.cycles_dropped += 1;
            return Err(CodecError::ChunkOverflow { max });
        }

        self.frames.push(message.video);
        self.pcm.put(message.audio);
        self.cycle_len += 1;

        if self.cycle_len < self.min_chunk_size {
            return Ok(None);
        }
        self.finalize().map(Some)
    }

    /// Concatenate and decode the in-progress cycle into a playback chunk.
    fn finalize(&mut self) -> Result<MediaChunk, CodecError> {
        let pcm = std::mem::take(&mut self.pcm);
        let frames = std::mem::replace(&mut self.frames, Vec::with_capacity(self.min_chunk_size));
        self.reset_cycle();

        let samples = match pcm::decode_pcm16(&pcm) {
            Ok(samples) => samples,
            Err(e) => {
                // The frames of this cycle go down with the audio so the
                // next finalized chunk is still a matched pair.
                self.cycles_dropped += 1;
                return Err(e);
            }
        };

        self.chunks_finalized += 1;
        debug!(
            frames = frames.len(),
            samples = samples.len(),
            chunk = self.chunks_finalized,
            "finalized media chunk"
        );

        Ok(MediaChunk {
            frames,
            audio: DecodedAudioBuffer {
                samples,
                sample_rate: self.sample_rate,
            },
        })
    }

    fn reset_cycle(&mut self) {
        self.frames.clear();
        self.pcm.clear();
        self.cycle_len = 0;
        self.cycle_bytes = 0;
    }

    /// Messages received since the last chunk boundary
    pub fn cycle_len(&self) -> usize {
        self.cycle_len
    }

    /// Chunks finalized over the session
    pub fn chunks_finalized(&self) -> u64 {
        self.chunks_finalized
    }

    /// Cycles dropped because of bad audio or overflow
    pub fn cycles_dropped(&self) -> u64 {
        self.cycles_dropped
    }
}
