//! Typed signaling calls with per-topic timeouts.

use super::SignalingChannel;
use crate::config::SignalingTimeouts;
use crate::errors::SignalingError;
use crate::observability::metrics;
use serde::de::DeserializeOwned;
use serde_json::Value;
use signaling_protocol::{
    ConnectOutcome, ConnectTransportRequest, ConsumeMediaRequest, ConsumeOutcome,
    JoinRoomRequest, JoinRoomResponse, ProduceOutcome, SignalingNotification, SignalingRequest,
    StartProducingRequest, TransportParameters, TransportRequest, UnpauseConsumerRequest,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Typed wrapper over a [`SignalingChannel`].
///
/// Cheap to clone; negotiation tasks each hold their own copy.
#[derive(Clone)]
pub struct SignalingClient {
    channel: Arc<dyn SignalingChannel>,
    timeouts: SignalingTimeouts,
}

impl SignalingClient {
    /// Create a client over `channel`.
    #[must_use]
    pub fn new(channel: Arc<dyn SignalingChannel>, timeouts: SignalingTimeouts) -> Self {
        Self { channel, timeouts }
    }

    /// Timeouts applied by this client.
    #[must_use]
    pub const fn timeouts(&self) -> &SignalingTimeouts {
        &self.timeouts
    }

    /// `joinRoom`.
    pub async fn join_room(
        &self,
        request: JoinRoomRequest,
    ) -> Result<JoinRoomResponse, SignalingError> {
        self.call(SignalingRequest::JoinRoom(request)).await
    }

    /// `requestTransport`.
    pub async fn request_transport(
        &self,
        request: TransportRequest,
    ) -> Result<TransportParameters, SignalingError> {
        self.call(SignalingRequest::RequestTransport(request)).await
    }

    /// `connectTransport`.
    pub async fn connect_transport(
        &self,
        request: ConnectTransportRequest,
    ) -> Result<ConnectOutcome, SignalingError> {
        self.call(SignalingRequest::ConnectTransport(request)).await
    }

    /// `startProducing`.
    pub async fn start_producing(
        &self,
        request: StartProducingRequest,
    ) -> Result<ProduceOutcome, SignalingError> {
        self.call(SignalingRequest::StartProducing(request)).await
    }

    /// `consumeMedia`.
    pub async fn consume_media(
        &self,
        request: ConsumeMediaRequest,
    ) -> Result<ConsumeOutcome, SignalingError> {
        self.call(SignalingRequest::ConsumeMedia(request)).await
    }

    /// `unpauseConsumer`. The acknowledgment payload carries nothing.
    pub async fn unpause_consumer(
        &self,
        request: UnpauseConsumerRequest,
    ) -> Result<(), SignalingError> {
        let _ack: Value = self.call(SignalingRequest::UnpauseConsumer(request)).await?;
        Ok(())
    }

    /// Best-effort notification; failures are logged, never returned.
    pub fn notify(&self, notification: SignalingNotification) {
        if let Err(e) = self.channel.notify(notification.clone()) {
            warn!(
                target: "sfu.signaling",
                notification = ?notification,
                error = %e,
                "Notification dropped"
            );
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: SignalingRequest,
    ) -> Result<T, SignalingError> {
        let topic = request.topic();
        let timeout = self.timeouts.for_topic(topic);
        let started = Instant::now();

        let result = tokio::time::timeout(timeout, self.channel.request(request)).await;
        metrics::record_signaling_latency(topic.as_str(), started.elapsed());

        let payload = match result {
            Ok(response) => response?,
            Err(_) => {
                metrics::record_signaling_timeout(topic.as_str());
                warn!(
                    target: "sfu.signaling",
                    topic = topic.as_str(),
                    timeout_ms = timeout.as_millis(),
                    "Signaling request timed out"
                );
                return Err(SignalingError::Timeout {
                    topic: topic.as_str(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        debug!(target: "sfu.signaling", topic = topic.as_str(), "Signaling response received");

        serde_json::from_value(payload).map_err(|e| SignalingError::InvalidResponse {
            topic: topic.as_str(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::types::{MediaId, MediaKind};
    use serde_json::json;
    use signaling_protocol::{MuteState, UnavailableReason};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every request with a fixed payload after an optional delay.
    struct FixedChannel {
        payload: Value,
        delay: Option<Duration>,
        notifications: Mutex<Vec<SignalingNotification>>,
    }

    impl FixedChannel {
        fn new(payload: Value) -> Arc<Self> {
            Arc::new(Self {
                payload,
                delay: None,
                notifications: Mutex::new(Vec::new()),
            })
        }

        fn delayed(payload: Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                payload,
                delay: Some(delay),
                notifications: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SignalingChannel for FixedChannel {
        async fn request(&self, _request: SignalingRequest) -> Result<Value, SignalingError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.payload.clone())
        }

        fn notify(&self, notification: SignalingNotification) -> Result<(), SignalingError> {
            self.notifications.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn consume_request() -> ConsumeMediaRequest {
        ConsumeMediaRequest {
            rtp_capabilities: signaling_protocol::RtpCapabilities::default(),
            pid: MediaId::new("v1"),
            kind: MediaKind::Video,
        }
    }

    #[tokio::test]
    async fn test_consume_media_decodes_sentinel() {
        let client = SignalingClient::new(
            FixedChannel::new(json!("cannotConsume")),
            SignalingTimeouts::default(),
        );

        let outcome = client.consume_media(consume_request()).await.unwrap();
        assert_eq!(
            outcome,
            ConsumeOutcome::Unavailable(UnavailableReason::CannotConsume)
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_is_reported_with_topic() {
        let client = SignalingClient::new(
            FixedChannel::new(json!({"unexpected": true})),
            SignalingTimeouts::default(),
        );

        let result = client.request_transport(TransportRequest::Producer).await;
        assert!(matches!(
            result,
            Err(SignalingError::InvalidResponse {
                topic: "requestTransport",
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_per_topic() {
        let timeouts = SignalingTimeouts {
            consume: Duration::from_millis(200),
            ..SignalingTimeouts::default()
        };
        let client = SignalingClient::new(
            FixedChannel::delayed(json!("consumeFailed"), Duration::from_secs(1)),
            timeouts,
        );

        let result = client.consume_media(consume_request()).await;
        assert!(matches!(
            result,
            Err(SignalingError::Timeout {
                topic: "consumeMedia",
                timeout_ms: 200
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_within_timeout_succeeds() {
        let client = SignalingClient::new(
            FixedChannel::delayed(json!("success"), Duration::from_secs(3)),
            SignalingTimeouts::default(),
        );

        let outcome = client
            .connect_transport(ConnectTransportRequest {
                dtls_parameters: signaling_protocol::DtlsParameters::default(),
                direction: common::types::TransportDirection::Send,
                audio_pid: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, ConnectOutcome::Success);
    }

    #[tokio::test]
    async fn test_unpause_ignores_ack_payload() {
        let client = SignalingClient::new(
            FixedChannel::new(json!({"ok": 1})),
            SignalingTimeouts::default(),
        );

        client
            .unpause_consumer(UnpauseConsumerRequest {
                pid: MediaId::new("a1"),
                kind: MediaKind::Audio,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_notify_forwards_to_channel() {
        let channel = FixedChannel::new(Value::Null);
        let client = SignalingClient::new(channel.clone(), SignalingTimeouts::default());

        client.notify(SignalingNotification::AudioChange(MuteState::Mute));

        let sent = channel.notifications.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![SignalingNotification::AudioChange(MuteState::Mute)]
        );
    }
}
