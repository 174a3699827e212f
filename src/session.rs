//! Streaming session lifecycle
//!
//! A [`FaceSession`] owns every piece of per-session state: the transport,
//! the accumulator, the chunk queue and the playback scheduler. Everything is
//! created at [`FaceSession::start`] and torn down together, so no state
//! outlives the session and cancellation is one atomic operation.

use crate::codec::decode_message;
use crate::config::StreamConfig;
use crate::error::{Result, TransportError};
use crate::media::accumulator::ChunkAccumulator;
use crate::media::queue::{create_shared_queue, ChunkQueue, SharedChunkQueue};
use crate::network::LipsyncTransport;
use crate::playback::scheduler::PlaybackScheduler;
use crate::playback::sink::{AudioSink, VideoSink};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

/// Why the conversation ended. This is all the caller is told; subsystem
/// detail stays in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller stopped the session
    Stopped,
    /// The service closed the connection normally
    TransportClosed,
    /// The connection failed (error or inactivity timeout)
    TransportFailed,
    /// Too many consecutive undecodable messages; pairing can no longer be
    /// trusted
    Desynchronized,
    /// The audio output failed
    SinkFailed,
}

/// Records the first close reason and ignores later ones, so racing
/// failure paths cannot overwrite what actually ended the session.
pub(crate) struct ReasonCell {
    tx: watch::Sender<Option<CloseReason>>,
}

impl ReasonCell {
    fn new() -> (Arc<Self>, watch::Receiver<Option<CloseReason>>) {
        let (tx, rx) = watch::channel(None);
        (Arc::new(Self { tx }), rx)
    }

    pub(crate) fn set(&self, reason: CloseReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

/// One live avatar streaming session
pub struct FaceSession {
    id: Uuid,
    transport: Option<LipsyncTransport>,
    queue: SharedChunkQueue,
    cancel: CancellationToken,
    reason: Arc<ReasonCell>,
    reason_rx: watch::Receiver<Option<CloseReason>>,
    ingest: Option<JoinHandle<()>>,
    scheduler: Option<JoinHandle<()>>,
}

impl FaceSession {
    /// Connect to the lip-sync service and start the playback pipeline.
    ///
    /// The session token is sent as the first message on the socket. The
    /// sinks receive decoded media until the session closes.
    pub async fn start<A, V>(
        config: StreamConfig,
        session_token: &str,
        audio_sink: A,
        video_sink: V,
    ) -> Result<Self>
    where
        A: AudioSink + Send + 'static,
        V: VideoSink + Send + 'static,
    {
        config.validate()?;

        let id = Uuid::new_v4();
        let span = info_span!("face_session", %id);
        let cancel = CancellationToken::new();
        let (reason, reason_rx) = ReasonCell::new();

        let (transport, inbound) = LipsyncTransport::connect(
            &config.endpoint,
            session_token,
            config.inactivity_timeout(),
            cancel.clone(),
        )
        .await?;

        let queue = create_shared_queue(config.queue_capacity);
        let accumulator = ChunkAccumulator::new(
            config.min_chunk_size,
            config.sample_rate,
            config.max_chunk_bytes,
        );

        let ingest = tokio::spawn(
            ingest_loop(
                inbound,
                accumulator,
                Arc::clone(&queue),
                transport.take_error_handle(),
                cancel.clone(),
                Arc::clone(&reason),
                config.max_decode_failures,
            )
            .instrument(span.clone()),
        );

        let scheduler = PlaybackScheduler::new(
            Arc::clone(&queue),
            audio_sink,
            video_sink,
            config.frame_interval(),
            config.drain_interval(),
            cancel.clone(),
        );
        let scheduler_cancel = cancel.clone();
        let scheduler_reason = Arc::clone(&reason);
        let scheduler = tokio::spawn(
            async move {
                if let Err(e) = scheduler.run().await {
                    error!("audio sink failed: {e}");
                    scheduler_reason.set(CloseReason::SinkFailed);
                    scheduler_cancel.cancel();
                }
            }
            .instrument(span),
        );

        Ok(Self {
            id,
            transport: Some(transport),
            queue,
            cancel,
            reason,
            reason_rx,
            ingest: Some(ingest),
            scheduler: Some(scheduler),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Push upstream voice audio to the lip-sync service. Fire-and-forget.
    pub fn send_audio(&self, audio: Bytes) {
        if let Some(transport) = &self.transport {
            transport.send(audio);
        }
    }

    /// The paired chunk queue, for observing backlog and overflow counts
    pub fn queue(&self) -> &ChunkQueue {
        &self.queue
    }

    /// Whether the session has ended (or is tearing down)
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the session to end and return the reason
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.reason_rx.clone();
        loop {
            if let Some(reason) = *rx.borrow() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return CloseReason::Stopped;
            }
        }
    }

    /// Stop the session: scheduler, sink and transport go down together and
    /// all queued media is discarded. Returns the close reason, which is an
    /// earlier failure when one already ended the session.
    pub async fn close(mut self) -> CloseReason {
        self.reason.set(CloseReason::Stopped);
        self.cancel.cancel();

        if let Some(scheduler) = self.scheduler.take() {
            let _ = scheduler.await;
        }
        if let Some(ingest) = self.ingest.take() {
            let _ = ingest.await;
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }

        let reason = (*self.reason_rx.borrow()).unwrap_or(CloseReason::Stopped);
        debug!(?reason, "session closed");
        reason
    }
}

impl Drop for FaceSession {
    fn drop(&mut self) {
        // Best effort when the caller never awaited close().
        self.cancel.cancel();
    }
}

/// Decode inbound messages in arrival order and feed the accumulator.
///
/// Individual bad messages (and bad chunks) are dropped and logged; only a
/// run of `max_decode_failures` consecutive failures ends the session, since
/// silent drops eventually drift the pairing beyond repair.
pub(crate) async fn ingest_loop(
    mut inbound: mpsc::Receiver<Bytes>,
    mut accumulator: ChunkAccumulator,
    queue: SharedChunkQueue,
    transport_error: Arc<parking_lot::Mutex<Option<TransportError>>>,
    cancel: CancellationToken,
    reason: Arc<ReasonCell>,
    max_decode_failures: u32,
) {
    let mut consecutive_failures = 0u32;

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                // The reader records why it stopped before cancelling, so a
                // transport-initiated shutdown still surfaces its reason here.
                // A caller-initiated close leaves no error and sets its own.
                if let Some(e) = transport_error.lock().take() {
                    reason.set(transport_reason(e));
                }
                break;
            }
            message = inbound.recv() => message,
        };

        let Some(raw) = message else {
            // Channel closed: the transport is gone. Map how it went down.
            let code = match transport_error.lock().take() {
                Some(e) => transport_reason(e),
                None => CloseReason::TransportClosed,
            };
            reason.set(code);
            cancel.cancel();
            break;
        };

        let outcome = decode_message(&raw).and_then(|decoded| accumulator.push(decoded));
        match outcome {
            Ok(Some(chunk)) => {
                consecutive_failures = 0;
                if !queue.push(chunk) {
                    warn!(
                        overflows = queue.overflow_count(),
                        "chunk queue full, dropping finalized chunk"
                    );
                }
            }
            Ok(None) => {
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                if e.is_malformed_frame() {
                    warn!(
                        consecutive = consecutive_failures,
                        "dropping undecodable message: {e}"
                    );
                } else {
                    warn!(
                        consecutive = consecutive_failures,
                        "dropping accumulation cycle: {e}"
                    );
                }
                if consecutive_failures >= max_decode_failures {
                    error!(
                        limit = max_decode_failures,
                        "stream desynchronized, ending session"
                    );
                    reason.set(CloseReason::Desynchronized);
                    cancel.cancel();
                    break;
                }
            }
        }
    }

    debug!("ingest loop stopped");
}

fn transport_reason(error: TransportError) -> CloseReason {
    match error {
        TransportError::Closed => CloseReason::TransportClosed,
        e => {
            warn!("session ended by transport failure: {e}");
            CloseReason::TransportFailed
        }
    }
}
