//! Signaling channel over a framed byte stream.
//!
//! A writer task drains an outbound queue into the framed sink. A reader
//! task routes `response` frames to the pending request with the same id and
//! forwards `event` frames as [`ChannelEvent::Push`]. When the stream ends,
//! fails, or the channel is cancelled, every pending request fails with
//! [`SignalingError::ChannelClosed`] and [`ChannelEvent::Disconnected`] is
//! emitted once.

use super::{ChannelEvent, SignalingChannel, CHANNEL_EVENT_CAPACITY};
use crate::errors::SignalingError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use signaling_protocol::{Envelope, SignalingCodec, SignalingNotification, SignalingRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outbound frame queue depth.
const OUTBOUND_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// [`SignalingChannel`] over any `AsyncRead + AsyncWrite` stream.
pub struct StreamSignalingChannel {
    outbound: mpsc::Sender<Envelope>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    cancel_token: CancellationToken,
}

impl StreamSignalingChannel {
    /// Start reader and writer tasks over `stream`.
    ///
    /// Returns the channel and the receiver of non-response inbound traffic.
    /// [`ChannelEvent::Connected`] is the first event delivered.
    pub fn spawn<S>(
        stream: S,
        cancel_token: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<ChannelEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_EVENT_CAPACITY);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        // Queue Connected before any pushed event can be forwarded
        let _ = events_tx.try_send(ChannelEvent::Connected);

        tokio::spawn(run_writer(
            FramedWrite::new(write_half, SignalingCodec),
            outbound_rx,
            cancel_token.clone(),
        ));
        tokio::spawn(run_reader(
            FramedRead::new(read_half, SignalingCodec),
            Arc::clone(&pending),
            Arc::clone(&closed),
            events_tx,
            cancel_token.clone(),
        ));

        let channel = Arc::new(Self {
            outbound: outbound_tx,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            cancel_token,
        });

        (channel, events_rx)
    }

    /// Whether the stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop both tasks and fail pending requests.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    fn lock_pending(
        pending: &Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Value>>> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a pending slot when its request future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        StreamSignalingChannel::lock_pending(self.pending).remove(&self.id);
    }
}

#[async_trait]
impl SignalingChannel for StreamSignalingChannel {
    async fn request(&self, request: SignalingRequest) -> Result<Value, SignalingError> {
        if self.is_closed() {
            return Err(SignalingError::ChannelClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        Self::lock_pending(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        // The reader marks the channel closed before draining pending slots
        if self.is_closed() {
            return Err(SignalingError::ChannelClosed);
        }

        debug!(target: "sfu.signaling", id, topic = request.topic().as_str(), "Sending request");

        self.outbound
            .send(Envelope::Request { id, request })
            .await
            .map_err(|_| SignalingError::ChannelClosed)?;

        rx.await.map_err(|_| SignalingError::ChannelClosed)
    }

    fn notify(&self, notification: SignalingNotification) -> Result<(), SignalingError> {
        self.outbound
            .try_send(Envelope::Notification { notification })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SignalingError::Backlogged,
                mpsc::error::TrySendError::Closed(_) => SignalingError::ChannelClosed,
            })
    }
}

impl Drop for StreamSignalingChannel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[instrument(skip_all, name = "sfu.signaling.writer")]
async fn run_writer<W>(
    mut sink: FramedWrite<W, SignalingCodec>,
    mut outbound: mpsc::Receiver<Envelope>,
    cancel_token: CancellationToken,
) where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            envelope = outbound.recv() => {
                let Some(envelope) = envelope else { break };
                let kind = envelope.kind();
                if let Err(e) = sink.send(envelope).await {
                    warn!(target: "sfu.signaling", kind, error = %e, "Failed to write frame");
                    cancel_token.cancel();
                    break;
                }
            }
        }
    }

    debug!(target: "sfu.signaling", "Signaling writer stopped");
}

#[instrument(skip_all, name = "sfu.signaling.reader")]
async fn run_reader<R>(
    mut source: FramedRead<R, SignalingCodec>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    events: mpsc::Sender<ChannelEvent>,
    cancel_token: CancellationToken,
) where
    R: AsyncRead + Send + Unpin,
{
    let reason = loop {
        tokio::select! {
            () = cancel_token.cancelled() => break "channel closed locally".to_string(),
            frame = source.next() => match frame {
                Some(Ok(Envelope::Response { id, payload })) => {
                    let waiter = StreamSignalingChannel::lock_pending(&pending).remove(&id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(payload);
                        }
                        None => {
                            debug!(target: "sfu.signaling", id, "Response for unknown or expired request");
                        }
                    }
                }
                Some(Ok(Envelope::Event { event })) => {
                    if events.send(ChannelEvent::Push(event)).await.is_err() {
                        break "event receiver dropped".to_string();
                    }
                }
                Some(Ok(other)) => {
                    warn!(target: "sfu.signaling", kind = other.kind(), "Unexpected frame from peer");
                }
                Some(Err(e)) => break format!("frame error: {e}"),
                None => break "stream closed by peer".to_string(),
            }
        }
    };

    closed.store(true, Ordering::SeqCst);
    // Dropping the senders fails every waiting request
    StreamSignalingChannel::lock_pending(&pending).clear();
    cancel_token.cancel();

    info!(target: "sfu.signaling", reason = %reason, "Signaling channel disconnected");
    let _ = events.send(ChannelEvent::Disconnected { reason }).await;
}
