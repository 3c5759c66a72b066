//! Negotiated transports and the deferred connect handshake.
//!
//! A transport starts `Created`. The first produce or consume on it runs the
//! two-phase connect handshake: local DTLS parameters go out in
//! `connectTransport`, and on `success` the engine transport completes its
//! connection. The handshake runs at most once per transport. Concurrent
//! first callers share one round trip, and a failed handshake is terminal.

use crate::engine::EngineTransport;
use crate::errors::SessionError;
use crate::observability::metrics;
use crate::signaling::SignalingClient;
use common::types::{MediaId, TransportDirection};
use signaling_protocol::{ConnectOutcome, ConnectTransportRequest};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

/// Connection state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Built locally, handshake not yet attempted.
    Created,
    /// Handshake in flight.
    Connecting,
    /// Handshake succeeded.
    Connected,
    /// Handshake failed; terminal.
    Failed,
    /// Closed locally; terminal.
    Closed,
}

/// One directional transport bound to an engine transport.
pub struct Transport {
    engine_transport: Arc<dyn EngineTransport>,
    direction: TransportDirection,
    owner: Option<MediaId>,
    signaling: SignalingClient,
    connect_gate: OnceCell<Result<(), String>>,
    state: watch::Sender<TransportState>,
}

impl Transport {
    /// Wrap an engine transport. `owner` is the remote audio id for
    /// receive transports and `None` for the send transport.
    #[must_use]
    pub fn new(
        engine_transport: Arc<dyn EngineTransport>,
        direction: TransportDirection,
        owner: Option<MediaId>,
        signaling: SignalingClient,
    ) -> Self {
        let (state, _) = watch::channel(TransportState::Created);
        Self {
            engine_transport,
            direction,
            owner,
            signaling,
            connect_gate: OnceCell::new(),
            state,
        }
    }

    /// Server-side transport id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.engine_transport.id()
    }

    #[must_use]
    pub const fn direction(&self) -> TransportDirection {
        self.direction
    }

    /// Remote audio id this receive transport belongs to.
    #[must_use]
    pub fn owner(&self) -> Option<&MediaId> {
        self.owner.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn EngineTransport> {
        &self.engine_transport
    }

    pub(crate) fn signaling(&self) -> &SignalingClient {
        &self.signaling
    }

    /// Run the connect handshake unless it already ran.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TransportConnect` if this or an earlier
    /// handshake on this transport failed.
    pub async fn ensure_connected(&self) -> Result<(), SessionError> {
        let outcome = self
            .connect_gate
            .get_or_init(|| self.run_connect_handshake())
            .await;

        outcome
            .clone()
            .map_err(|reason| SessionError::TransportConnect {
                direction: self.direction,
                reason,
            })
    }

    async fn run_connect_handshake(&self) -> Result<(), String> {
        if self.state() == TransportState::Closed {
            return Err("transport closed".to_string());
        }

        self.state.send_replace(TransportState::Connecting);
        debug!(
            target: "sfu.transport",
            transport_id = %self.id(),
            direction = self.direction.as_str(),
            "Connect handshake started"
        );

        let (result, outcome) = self.connect_handshake().await;
        metrics::record_transport_connect(self.direction.as_str(), outcome);

        match result {
            Ok(()) => {
                if !self.advance(TransportState::Connected) {
                    debug!(
                        target: "sfu.transport",
                        transport_id = %self.id(),
                        "Transport closed during connect handshake"
                    );
                    return Err("transport closed".to_string());
                }
                info!(
                    target: "sfu.transport",
                    transport_id = %self.id(),
                    direction = self.direction.as_str(),
                    "Transport connected"
                );
                Ok(())
            }
            Err(reason) => {
                self.advance(TransportState::Failed);
                warn!(
                    target: "sfu.transport",
                    transport_id = %self.id(),
                    direction = self.direction.as_str(),
                    reason = %reason,
                    "Transport connect failed"
                );
                Err(reason)
            }
        }
    }

    /// Move to `next` unless the transport was closed meanwhile.
    fn advance(&self, next: TransportState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == TransportState::Closed {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// Returns the handshake result and its metric outcome label.
    async fn connect_handshake(&self) -> (Result<(), String>, &'static str) {
        let dtls_parameters = match self.engine_transport.local_dtls_parameters().await {
            Ok(params) => params,
            Err(e) => return (Err(e.to_string()), "error"),
        };

        let request = ConnectTransportRequest {
            dtls_parameters,
            direction: self.direction,
            audio_pid: self.owner.clone(),
        };

        match self.signaling.connect_transport(request).await {
            Ok(ConnectOutcome::Success) => match self.engine_transport.complete_connect().await {
                Ok(()) => (Ok(()), "success"),
                Err(e) => (Err(e.to_string()), "error"),
            },
            Ok(ConnectOutcome::Failed(reason)) => {
                (Err(format!("peer rejected connect: {reason}")), "rejected")
            }
            Err(e) if e.is_timeout() => (Err(e.to_string()), "timeout"),
            Err(e) => (Err(e.to_string()), "error"),
        }
    }

    /// Close the engine transport. Idempotent.
    pub fn close(&self) {
        let previous = self.state.send_replace(TransportState::Closed);
        if previous != TransportState::Closed {
            self.engine_transport.close();
            debug!(
                target: "sfu.transport",
                transport_id = %self.id(),
                direction = self.direction.as_str(),
                "Transport closed"
            );
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id())
            .field("direction", &self.direction)
            .field("owner", &self.owner)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
