//! Bounded queue of ready-to-play chunks
//!
//! Single producer (the session ingest task), single consumer (the playback
//! scheduler). Lock-free underneath, with a [`Notify`] so the consumer can
//! sleep until something arrives instead of busy-polling.

use crate::media::MediaChunk;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// FIFO of finalized [`MediaChunk`]s awaiting playback
pub struct ChunkQueue {
    queue: ArrayQueue<MediaChunk>,
    notify: Notify,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl ChunkQueue {
    /// Create a queue bounded to `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            notify: Notify::new(),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a chunk and wake the consumer.
    /// Returns false when the queue is full (the chunk is dropped and the
    /// overflow counted); the remote service is pushing faster than the
    /// sink plays.
    pub fn push(&self, chunk: MediaChunk) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => {
                self.notify.notify_one();
                true
            }
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop the next chunk, counting an underrun when empty
    pub fn pop(&self) -> Option<MediaChunk> {
        match self.queue.pop() {
            Some(chunk) => Some(chunk),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pop without counting an underrun (used while idle or draining)
    pub fn try_pop(&self) -> Option<MediaChunk> {
        self.queue.pop()
    }

    /// Resolve when a producer has pushed since this call started.
    /// Spurious wakeups are fine; callers re-check the queue.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a chunk queue
pub type SharedChunkQueue = Arc<ChunkQueue>;

/// Create a new shared chunk queue
pub fn create_shared_queue(capacity: usize) -> SharedChunkQueue {
    Arc::new(ChunkQueue::new(capacity))
}
