//! Playback scheduling
//!
//! A single task drives playback as an explicit state machine instead of the
//! completion-callback recursion a browser audio pipeline would use:
//!
//! - **Playing**: one chunk's audio runs on the [`AudioSink`] while the
//!   paired frame group is stepped at the fixed frame cadence. When the sink
//!   reports the buffer ended, the next queued chunk starts immediately.
//! - **Draining**: the queue is empty but the session is open; the task
//!   sleeps until the queue signals a push, with a low-frequency poll as a
//!   backstop against a wakeup lost between the empty check and the wait.
//! - Cancellation stops audio, frame ticking and the drain poll together.
//!
//! Frame cadence is independent of audio length: if a frame group runs out
//! before its audio buffer finishes, the group replays from its start. This
//! wrap-around matches the upstream service's pacing, where a group normally
//! lasts exactly as long as its audio.

use crate::error::SinkError;
use crate::media::queue::SharedChunkQueue;
use crate::media::MediaChunk;
use crate::playback::sink::{AudioSink, VideoSink};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Playing,
    Draining,
}

/// Pops paired chunks off the queue and drives both sinks
pub struct PlaybackScheduler<A, V> {
    queue: SharedChunkQueue,
    audio_sink: A,
    video_sink: V,
    frame_interval: Duration,
    drain_interval: Duration,
    cancel: CancellationToken,
}

impl<A, V> PlaybackScheduler<A, V>
where
    A: AudioSink,
    V: VideoSink,
{
    pub fn new(
        queue: SharedChunkQueue,
        audio_sink: A,
        video_sink: V,
        frame_interval: Duration,
        drain_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            audio_sink,
            video_sink,
            frame_interval,
            drain_interval,
            cancel,
        }
    }

    /// Run until cancelled or the audio sink fails.
    ///
    /// Sink failure is terminal for the session; the caller maps it to the
    /// user-visible close reason.
    pub async fn run(mut self) -> Result<(), SinkError> {
        let mut state = State::Idle;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // A miss straight after a chunk finished is a real underrun;
            // misses while idle or draining are just the empty-queue wait.
            let next = if state == State::Playing {
                self.queue.pop()
            } else {
                self.queue.try_pop()
            };
            match next {
                Some(chunk) => {
                    if state != State::Playing {
                        debug!(from = ?state, "chunk ready, playing");
                        state = State::Playing;
                    }
                    self.play_chunk(chunk).await?;
                }
                None => {
                    if state == State::Playing {
                        debug!("queue empty, draining");
                        state = State::Draining;
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.queue.notified() => {}
                        _ = tokio::time::sleep(self.drain_interval) => {}
                    }
                }
            }
        }

        debug!("playback scheduler stopped");
        Ok(())
    }

    /// Play one chunk: audio on the sink, frames on the fixed cadence.
    async fn play_chunk(&mut self, chunk: MediaChunk) -> Result<(), SinkError> {
        debug!(
            frames = chunk.frames.len(),
            samples = chunk.audio.samples.len(),
            duration_ms = chunk.audio.duration().as_millis() as u64,
            "playing chunk"
        );

        let Self {
            audio_sink,
            video_sink,
            cancel,
            frame_interval,
            ..
        } = self;

        let play = audio_sink.play(&chunk.audio);
        tokio::pin!(play);

        let mut ticker = tokio::time::interval(*frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame_index = 0usize;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = &mut play => return result,
                _ = ticker.tick() => {
                    if chunk.frames.is_empty() {
                        continue;
                    }
                    if let Err(e) = video_sink.render(&chunk.frames[frame_index]) {
                        // Render problems never stall audio.
                        warn!("video render failed: {e}");
                    }
                    // Wrap to the start of the group if it empties before
                    // the audio does.
                    frame_index = (frame_index + 1) % chunk.frames.len();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::queue::create_shared_queue;
    use crate::media::DecodedAudioBuffer;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Audio sink that sleeps for the buffer's duration and records when
    /// each play started.
    struct RecordingAudioSink {
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl AudioSink for RecordingAudioSink {
        async fn play(&mut self, buffer: &DecodedAudioBuffer) -> Result<(), SinkError> {
            self.starts.lock().push(Instant::now());
            tokio::time::sleep(buffer.duration()).await;
            Ok(())
        }
    }

    /// Audio sink whose output is gone; every play fails.
    struct FailingAudioSink;

    #[async_trait]
    impl AudioSink for FailingAudioSink {
        async fn play(&mut self, _buffer: &DecodedAudioBuffer) -> Result<(), SinkError> {
            Err(SinkError::PlaybackFailed("output device went away".to_string()))
        }
    }

    struct RecordingVideoSink {
        rendered: Arc<Mutex<Vec<u32>>>,
    }

    impl VideoSink for RecordingVideoSink {
        fn render(&mut self, frame: &crate::media::VideoFrame) -> Result<(), SinkError> {
            self.rendered.lock().push(frame.index);
            Ok(())
        }
    }

    fn frame(index: u32) -> crate::media::VideoFrame {
        crate::media::VideoFrame {
            index,
            width: 4,
            height: 4,
            data: bytes::Bytes::new(),
        }
    }

    /// `sample_rate` 1000 makes one sample one millisecond.
    fn chunk(frames: &[u32], duration_ms: usize) -> MediaChunk {
        MediaChunk {
            frames: frames.iter().copied().map(frame).collect(),
            audio: DecodedAudioBuffer {
                samples: vec![0.0; duration_ms],
                sample_rate: 1000,
            },
        }
    }

    struct Harness {
        queue: SharedChunkQueue,
        cancel: CancellationToken,
        starts: Arc<Mutex<Vec<Instant>>>,
        rendered: Arc<Mutex<Vec<u32>>>,
        handle: tokio::task::JoinHandle<Result<(), SinkError>>,
    }

    fn start_scheduler() -> Harness {
        let queue = create_shared_queue(8);
        let cancel = CancellationToken::new();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let scheduler = PlaybackScheduler::new(
            Arc::clone(&queue),
            RecordingAudioSink {
                starts: Arc::clone(&starts),
            },
            RecordingVideoSink {
                rendered: Arc::clone(&rendered),
            },
            Duration::from_millis(33),
            Duration::from_millis(800),
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());
        Harness {
            queue,
            cancel,
            starts,
            rendered,
            handle,
        }
    }

    async fn wait_for_plays(harness: &Harness, count: usize) {
        while harness.starts.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_produces_no_sink_activity() {
        let harness = start_scheduler();

        // Several drain poll cycles pass with nothing queued.
        tokio::time::sleep(Duration::from_secs(5)).await;

        harness.cancel.cancel();
        harness.handle.await.unwrap().unwrap();
        assert!(harness.starts.lock().is_empty());
        assert!(harness.rendered.lock().is_empty());
        // An empty queue that never played anything is not an underrun.
        assert_eq!(harness.queue.underrun_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_dry_after_playback_counts_one_underrun() {
        let harness = start_scheduler();

        harness.queue.push(chunk(&[0], 100));
        wait_for_plays(&harness, 1).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        // One underrun when the audio ran out; the drain polls afterwards
        // count nothing.
        assert_eq!(harness.queue.underrun_count(), 1);

        harness.cancel.cancel();
        harness.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_sink_failure_is_terminal() {
        let queue = create_shared_queue(8);
        let cancel = CancellationToken::new();
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let scheduler = PlaybackScheduler::new(
            Arc::clone(&queue),
            FailingAudioSink,
            RecordingVideoSink {
                rendered: Arc::clone(&rendered),
            },
            Duration::from_millis(33),
            Duration::from_millis(800),
            cancel,
        );

        queue.push(chunk(&[0], 100));
        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, SinkError::PlaybackFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_chunks_have_no_gap() {
        let harness = start_scheduler();

        harness.queue.push(chunk(&[0], 100));
        harness.queue.push(chunk(&[1], 100));
        wait_for_plays(&harness, 2).await;

        let starts = harness.starts.lock().clone();
        // The second chunk starts the instant the first one's audio ends.
        assert_eq!(starts[1] - starts[0], Duration::from_millis(100));

        harness.cancel.cancel();
        harness.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_group_wraps_while_audio_continues() {
        let harness = start_scheduler();

        // 3 frames but 200ms of audio: ticks at 0,33,...,198ms render seven
        // frames, wrapping through the group twice.
        harness.queue.push(chunk(&[0, 1, 2], 200));
        wait_for_plays(&harness, 1).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        harness.cancel.cancel();
        harness.handle.await.unwrap().unwrap();
        assert_eq!(*harness.rendered.lock(), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_arriving_during_drain_resumes_playback() {
        let harness = start_scheduler();

        // Let the scheduler settle into its empty-queue wait first.
        tokio::time::sleep(Duration::from_secs(2)).await;

        harness.queue.push(chunk(&[9], 50));
        wait_for_plays(&harness, 1).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(harness.rendered.lock().first().copied(), Some(9));
        harness.cancel.cancel();
        harness.handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_mid_chunk() {
        let harness = start_scheduler();

        harness.queue.push(chunk(&[0], 10_000));
        wait_for_plays(&harness, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        harness.cancel.cancel();
        harness.handle.await.unwrap().unwrap();

        // Nothing renders after cancellation.
        let rendered = harness.rendered.lock().len();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(harness.rendered.lock().len(), rendered);
    }
}
