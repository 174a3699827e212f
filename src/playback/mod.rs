//! Playback subsystem: output sinks and the chunk scheduler

pub mod scheduler;
pub mod sink;

pub use scheduler::PlaybackScheduler;
pub use sink::{AudioSink, CpalAudioSink, FrameHandler, VideoSink};
