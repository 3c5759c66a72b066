//! Inbound media: per-participant receive transports and consumers.

use super::transport::Transport;
use crate::engine::{EngineReceiver, MediaEngine, MediaTrack};
use crate::errors::{SessionError, SignalingError};
use crate::observability::metrics;
use crate::signaling::SignalingClient;
use common::types::{MediaId, MediaKind, TransportDirection};
use signaling_protocol::{
    ConsumeMediaRequest, ConsumeOutcome, ConsumerParameters, RtpCapabilities, TransportRequest,
    UnpauseConsumerRequest,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

/// Consumer lifecycle. The server creates consumers paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    PendingUnpause,
    Active,
    Closed,
}

/// One remote track received on a participant's transport.
pub struct Consumer {
    id: String,
    producer_id: MediaId,
    kind: MediaKind,
    track: MediaTrack,
    receiver: Box<dyn EngineReceiver>,
    state: Arc<watch::Sender<ConsumerState>>,
}

impl Consumer {
    fn new(params: &ConsumerParameters, receiver: Box<dyn EngineReceiver>) -> Self {
        let (state, _) = watch::channel(ConsumerState::PendingUnpause);
        Self {
            id: params.id.clone(),
            producer_id: params.producer_id.clone(),
            kind: params.kind,
            track: receiver.track(),
            receiver,
            state: Arc::new(state),
        }
    }

    /// Server-side consumer id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remote media id being consumed.
    #[must_use]
    pub fn producer_id(&self) -> &MediaId {
        &self.producer_id
    }

    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn track(&self) -> &MediaTrack {
        &self.track
    }

    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Wait until the consumer leaves `PendingUnpause`.
    ///
    /// Returns `true` if it became `Active`.
    pub async fn wait_active(&self) -> bool {
        let mut rx = self.state.subscribe();
        rx.wait_for(|s| *s != ConsumerState::PendingUnpause)
            .await
            .map(|s| *s == ConsumerState::Active)
            .unwrap_or(false)
    }

    /// Issue `unpauseConsumer` in the background.
    ///
    /// Publication does not wait for the acknowledgment; the consumer turns
    /// `Active` when it arrives.
    pub fn request_unpause(&self, signaling: SignalingClient) {
        let state = Arc::clone(&self.state);
        let request = UnpauseConsumerRequest {
            pid: self.producer_id.clone(),
            kind: self.kind,
        };

        tokio::spawn(async move {
            let pid = request.pid.clone();
            let kind = request.kind;
            match signaling.unpause_consumer(request).await {
                Ok(()) => {
                    state.send_if_modified(|s| {
                        if *s == ConsumerState::PendingUnpause {
                            *s = ConsumerState::Active;
                            true
                        } else {
                            false
                        }
                    });
                    debug!(target: "sfu.consumer", pid = %pid, kind = kind.as_str(), "Consumer unpaused");
                }
                Err(e) => {
                    warn!(
                        target: "sfu.consumer",
                        pid = %pid,
                        kind = kind.as_str(),
                        error = %e,
                        "Unpause failed, consumer stays paused"
                    );
                }
            }
        });
    }

    /// Close the receiver. Idempotent.
    pub fn close(&self) {
        let previous = self.state.send_replace(ConsumerState::Closed);
        if previous != ConsumerState::Closed {
            self.receiver.close();
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("producer_id", &self.producer_id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Build a local consumer on this receive transport.
    ///
    /// Runs the connect handshake if needed.
    ///
    /// # Errors
    ///
    /// - `SessionError::TransportConnect` if the handshake fails
    /// - `SessionError::Engine` if the engine cannot receive
    pub async fn consume(&self, params: &ConsumerParameters) -> Result<Consumer, SessionError> {
        if self.direction() != TransportDirection::Receive {
            return Err(SessionError::Internal(
                "consume on a send transport".to_string(),
            ));
        }

        self.ensure_connected().await?;
        let receiver = self.engine().receive(params).await?;
        Ok(Consumer::new(params, receiver))
    }
}

/// Creates receive transports, one per remote participant.
#[derive(Clone)]
pub struct ConsumerTransportManager {
    signaling: SignalingClient,
    engine: Arc<dyn MediaEngine>,
}

impl ConsumerTransportManager {
    #[must_use]
    pub fn new(signaling: SignalingClient, engine: Arc<dyn MediaEngine>) -> Self {
        Self { signaling, engine }
    }

    #[must_use]
    pub fn signaling(&self) -> &SignalingClient {
        &self.signaling
    }

    /// `requestTransport{consumer, audioPid}`, then a local receive
    /// transport keyed to `audio_pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the engine cannot build the
    /// transport.
    pub async fn create_consumer_transport(
        &self,
        audio_pid: &MediaId,
    ) -> Result<Arc<Transport>, SessionError> {
        let params = self
            .signaling
            .request_transport(TransportRequest::Consumer {
                audio_pid: audio_pid.clone(),
            })
            .await?;
        let engine_transport = self.engine.create_receive_transport(&params)?;

        debug!(
            target: "sfu.consumer",
            audio_id = %audio_pid,
            transport_id = %params.id,
            "Receive transport created"
        );

        Ok(Arc::new(Transport::new(
            engine_transport,
            TransportDirection::Receive,
            Some(audio_pid.clone()),
            self.signaling.clone(),
        )))
    }

    /// Consume one remote production on `transport`.
    ///
    /// Sentinel responses and consume timeouts become
    /// `SessionError::ConsumeUnavailable`. On success the unpause request is
    /// issued in the background.
    ///
    /// # Errors
    ///
    /// - `SessionError::ConsumeUnavailable` if the peer cannot serve `pid`
    /// - `SessionError::TransportConnect` if the transport handshake fails
    #[instrument(skip_all, name = "sfu.consumer.consume", fields(pid = %pid, kind = kind.as_str()))]
    pub async fn consume(
        &self,
        transport: &Transport,
        rtp_capabilities: &RtpCapabilities,
        pid: MediaId,
        kind: MediaKind,
    ) -> Result<Consumer, SessionError> {
        let request = ConsumeMediaRequest {
            rtp_capabilities: rtp_capabilities.clone(),
            pid: pid.clone(),
            kind,
        };

        let params = match self.signaling.consume_media(request).await {
            Ok(ConsumeOutcome::Ready(params)) => params,
            Ok(ConsumeOutcome::Unavailable(reason)) => {
                metrics::record_consume(kind.as_str(), reason.as_str());
                return Err(SessionError::ConsumeUnavailable {
                    pid,
                    kind,
                    reason: reason.as_str().to_string(),
                });
            }
            Err(e) => {
                let outcome = if e.is_timeout() { "timeout" } else { "error" };
                metrics::record_consume(kind.as_str(), outcome);
                return Err(unavailable(pid, kind, &e));
            }
        };

        let consumer = match transport.consume(&params).await {
            Ok(consumer) => consumer,
            Err(e) => {
                metrics::record_consume(kind.as_str(), "error");
                return Err(e);
            }
        };

        metrics::record_consume(kind.as_str(), "success");
        consumer.request_unpause(self.signaling.clone());
        Ok(consumer)
    }
}

fn unavailable(pid: MediaId, kind: MediaKind, error: &SignalingError) -> SessionError {
    SessionError::ConsumeUnavailable {
        pid,
        kind,
        reason: error.to_string(),
    }
}
