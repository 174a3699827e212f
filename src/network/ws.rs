//! WebSocket transport to the lip-sync service
//!
//! Owns the live socket. The session token goes out as the first message
//! right after the socket opens; after that the service streams multiplexed
//! binary messages in, and raw voice audio goes out untagged. Inbound
//! messages are forwarded over a channel in arrival order so exactly one
//! consumer decodes them.

use crate::error::TransportError;
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Channel depth for inbound messages awaiting decode
const INBOUND_BUFFER: usize = 64;

/// Live connection to the lip-sync service
pub struct LipsyncTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    /// Terminal error observed by the reader, if the session ended abruptly
    last_error: Arc<Mutex<Option<TransportError>>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl LipsyncTransport {
    /// Connect, send the session token, and spawn the socket tasks.
    ///
    /// Returns the transport handle plus the channel of inbound binary
    /// messages. The channel closing means the connection is gone; check
    /// [`take_error`](Self::take_error) for why.
    pub async fn connect(
        endpoint: &str,
        session_token: &str,
        inactivity_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Bytes>), TransportError> {
        let (socket, _response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!(endpoint, "connected to lip-sync service");

        let (mut ws_sink, ws_stream) = socket.split();

        // The service expects the token before anything else.
        ws_sink
            .send(Message::Text(session_token.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Bytes>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(INBOUND_BUFFER);
        let last_error = Arc::new(Mutex::new(None));

        let writer = tokio::spawn(Self::write_loop(ws_sink, outbound_rx, cancel.clone()));
        let reader = tokio::spawn(Self::read_loop(
            ws_stream,
            inbound_tx,
            inactivity_timeout,
            cancel.clone(),
            last_error.clone(),
        ));

        Ok((
            Self {
                outbound: outbound_tx,
                cancel,
                last_error,
                reader: Some(reader),
                writer: Some(writer),
            },
            inbound_rx,
        ))
    }

    /// Queue outbound audio bytes. Fire-and-forget: no acknowledgment, and
    /// sends after the connection is gone are silently dropped.
    pub fn send(&self, audio: Bytes) {
        if self.outbound.send(audio).is_err() {
            debug!("dropping outbound audio, connection is gone");
        }
    }

    /// Terminal error recorded by the reader, if any
    pub fn take_error(&self) -> Option<TransportError> {
        self.last_error.lock().take()
    }

    /// Shared handle to the terminal-error slot, read by the session after
    /// the inbound channel closes.
    pub(crate) fn take_error_handle(&self) -> Arc<Mutex<Option<TransportError>>> {
        Arc::clone(&self.last_error)
    }

    /// Cancel the socket tasks and wait for them to finish. The writer sends
    /// a close frame on its way out; an already-dead socket takes the same
    /// path.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }

    async fn write_loop<S>(
        mut ws_sink: S,
        mut outbound_rx: mpsc::UnboundedReceiver<Bytes>,
        cancel: CancellationToken,
    ) where
        S: Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                item = outbound_rx.recv() => {
                    let Some(audio) = item else { break };
                    if let Err(e) = ws_sink.send(Message::Binary(audio.to_vec())).await {
                        warn!("outbound send failed: {e}");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
        let _ = ws_sink.send(Message::Close(None)).await;
        debug!("transport writer stopped");
    }

    async fn read_loop<S>(
        mut ws_stream: S,
        inbound_tx: mpsc::Sender<Bytes>,
        inactivity_timeout: Duration,
        cancel: CancellationToken,
        last_error: Arc<Mutex<Option<TransportError>>>,
    ) where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let error = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break None,
                next = tokio::time::timeout(inactivity_timeout, ws_stream.next()) => next,
            };

            match next {
                Err(_) => break Some(TransportError::Timeout),
                Ok(None) => break Some(TransportError::Closed),
                Ok(Some(Err(e))) => break Some(TransportError::ReceiveFailed(e.to_string())),
                Ok(Some(Ok(Message::Binary(payload)))) => {
                    if inbound_tx.send(Bytes::from(payload)).await.is_err() {
                        // Consumer is gone; the session is shutting down.
                        break None;
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) => break Some(TransportError::Closed),
                Ok(Some(Ok(_))) => {
                    // Ping/pong and stray text frames carry no media.
                }
            }
        };

        if let Some(e) = error {
            match e {
                TransportError::Closed => debug!("lip-sync connection closed"),
                _ => warn!("transport failed: {e}"),
            }
            *last_error.lock() = Some(e);
        }
        // Dropping inbound_tx closes the channel; cancelling stops the writer.
        cancel.cancel();
        debug!("transport reader stopped");
    }
}
