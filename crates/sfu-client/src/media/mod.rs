//! Transports, producers, consumers and the consumer registry.
//!
//! - [`transport`] - directional transports and the connect handshake
//! - [`producer`] - the send transport and local producers
//! - [`consumer`] - receive transports and remote consumers
//! - [`registry`] - remote participants keyed by audio id
//! - [`negotiator`] - concurrent per-participant batch negotiation

pub mod consumer;
pub mod negotiator;
pub mod producer;
pub mod registry;
pub mod transport;

pub use consumer::{Consumer, ConsumerState, ConsumerTransportManager};
pub use negotiator::{BatchReport, ConsumerNegotiator};
pub use producer::{
    LocalProducers, Producer, ProducerRegistry, ProducerState, ProducerTransportManager,
};
pub use registry::{
    ConsumerEntry, ConsumerRegistry, EntrySummary, NegotiationClaim, RegistryEvent,
    RegistrySnapshot,
};
pub use transport::{Transport, TransportState};

/// Minimal in-crate fakes for unit tests that need real transports.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_support {
    use super::{Consumer, Transport};
    use crate::config::SignalingTimeouts;
    use crate::engine::{EngineReceiver, EngineSender, EngineTransport, MediaTrack};
    use crate::errors::{EngineError, SignalingError};
    use crate::signaling::{SignalingChannel, SignalingClient};
    use async_trait::async_trait;
    use common::types::{MediaId, MediaKind, TransportDirection};
    use serde_json::{json, Value};
    use signaling_protocol::{
        ConsumerParameters, DtlsParameters, RtpParameters, SignalingNotification,
        SignalingRequest,
    };
    use std::sync::Arc;

    /// Accepts every request with `"success"`.
    struct AcceptAll;

    #[async_trait]
    impl SignalingChannel for AcceptAll {
        async fn request(&self, _request: SignalingRequest) -> Result<Value, SignalingError> {
            Ok(json!("success"))
        }

        fn notify(&self, _notification: SignalingNotification) -> Result<(), SignalingError> {
            Ok(())
        }
    }

    struct FakeTransport {
        id: String,
    }

    #[async_trait]
    impl EngineTransport for FakeTransport {
        fn id(&self) -> &str {
            &self.id
        }

        async fn local_dtls_parameters(&self) -> Result<DtlsParameters, EngineError> {
            Ok(DtlsParameters(json!({"role": "auto"})))
        }

        async fn complete_connect(&self) -> Result<(), EngineError> {
            Ok(())
        }

        async fn send(&self, _track: &MediaTrack) -> Result<Box<dyn EngineSender>, EngineError> {
            Err(EngineError::Transport("receive only".to_string()))
        }

        async fn receive(
            &self,
            params: &ConsumerParameters,
        ) -> Result<Box<dyn EngineReceiver>, EngineError> {
            Ok(Box::new(FakeReceiver {
                track: MediaTrack::new(format!("track-{}", params.producer_id), params.kind),
            }))
        }

        fn close(&self) {}
    }

    struct FakeReceiver {
        track: MediaTrack,
    }

    impl EngineReceiver for FakeReceiver {
        fn track(&self) -> MediaTrack {
            self.track.clone()
        }

        fn close(&self) {}
    }

    pub(crate) fn signaling() -> SignalingClient {
        SignalingClient::new(Arc::new(AcceptAll), SignalingTimeouts::default())
    }

    pub(crate) fn receive_transport(audio_id: &str) -> Arc<Transport> {
        Arc::new(receive_transport_with(signaling(), audio_id))
    }

    pub(crate) fn receive_transport_with(signaling: SignalingClient, audio_id: &str) -> Transport {
        Transport::new(
            Arc::new(FakeTransport {
                id: format!("recv-{audio_id}"),
            }),
            TransportDirection::Receive,
            Some(MediaId::new(audio_id)),
            signaling,
        )
    }

    pub(crate) async fn consumer(transport: &Transport, pid: &str, kind: MediaKind) -> Consumer {
        transport
            .consume(&ConsumerParameters {
                id: format!("consumer-{pid}"),
                producer_id: MediaId::new(pid),
                kind,
                rtp_parameters: RtpParameters::default(),
            })
            .await
            .unwrap()
    }
}
