//! Scriptable signaling peer for SFU client testing.
//!
//! Answers every request topic the client sends, and can be configured to:
//! - Announce existing participants on join
//! - Reject connects, produces and consumes
//! - Delay or hang responses per topic or per production id
//! - Fail notifications as if the channel were closed
//!
//! Every request and notification is recorded for assertions.
//!
//! # Example
//!
//! ```rust,ignore
//! use sfu_test_utils::MockSignaling;
//!
//! let signaling = MockSignaling::builder()
//!     .reject_produce(MediaKind::Audio)
//!     .hang_consume("a2")
//!     .build();
//!
//! // Use Arc::new(signaling.clone()) as the SignalingChannel...
//! assert_eq!(signaling.request_count(RequestTopic::JoinRoom), 1);
//! ```

use async_trait::async_trait;
use common::types::{MediaId, MediaKind, TransportDirection};
use serde_json::{json, Value};
use sfu_client::errors::SignalingError;
use sfu_client::signaling::SignalingChannel;
use signaling_protocol::{
    ConnectTransportRequest, ConsumeBatch, ConsumerParameters, DtlsParameters, JoinRoomResponse,
    RequestTopic, RouterCapabilities, RtpParameters, SignalingNotification, SignalingRequest,
    TransportParameters, UnavailableReason,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fixtures::router_capabilities;

/// Mock signaling peer. Clones share state.
#[derive(Debug, Clone)]
pub struct MockSignaling {
    inner: Arc<Mutex<MockSignalingInner>>,
}

#[derive(Debug)]
struct MockSignalingInner {
    script: Script,
    transport_counter: u64,
    producer_counter: u64,
    requests: Vec<SignalingRequest>,
    notifications: Vec<SignalingNotification>,
}

/// Configured behavior.
#[derive(Debug, Clone)]
struct Script {
    router_capabilities: RouterCapabilities,
    existing: ConsumeBatch,
    connect_rejection: Option<String>,
    rejected_connect_owners: HashSet<MediaId>,
    rejected_produce: HashSet<MediaKind>,
    unavailable: HashMap<MediaId, UnavailableReason>,
    failed_transport_owners: HashSet<MediaId>,
    hung_topics: HashSet<RequestTopic>,
    hung_consumes: HashSet<MediaId>,
    consume_delays: HashMap<MediaId, Duration>,
    notifications_closed: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            router_capabilities: router_capabilities(),
            existing: ConsumeBatch::default(),
            connect_rejection: None,
            rejected_connect_owners: HashSet::new(),
            rejected_produce: HashSet::new(),
            unavailable: HashMap::new(),
            failed_transport_owners: HashSet::new(),
            hung_topics: HashSet::new(),
            hung_consumes: HashSet::new(),
            consume_delays: HashMap::new(),
            notifications_closed: false,
        }
    }
}

/// What to do with one request once the lock is released.
enum Reply {
    Now(Result<Value, SignalingError>),
    After(Duration, Value),
    Never,
}

impl Default for MockSignaling {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockSignaling {
    /// Create a new MockSignaling builder.
    #[must_use]
    pub fn builder() -> MockSignalingBuilder {
        MockSignalingBuilder::default()
    }

    /// Mock that accepts everything and announces an empty room.
    #[must_use]
    pub fn accepting() -> Self {
        Self::default()
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<SignalingRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Number of requests received for `topic`.
    pub fn request_count(&self, topic: RequestTopic) -> usize {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.topic() == topic)
            .count()
    }

    /// `consumeMedia` requests received for production `pid`.
    pub fn consume_requests_for(&self, pid: &str) -> usize {
        let pid = MediaId::new(pid);
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| matches!(r, SignalingRequest::ConsumeMedia(req) if req.pid == pid))
            .count()
    }

    /// `connectTransport` requests received, in order.
    pub fn connect_requests(&self) -> Vec<ConnectTransportRequest> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter_map(|r| match r {
                SignalingRequest::ConnectTransport(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    /// Notifications received so far, in order.
    pub fn notifications(&self) -> Vec<SignalingNotification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    /// Start failing notifications with `ChannelClosed`.
    pub fn close_notifications(&self) {
        self.inner.lock().unwrap().script.notifications_closed = true;
    }

    fn reply(&self, request: &SignalingRequest) -> Reply {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request.clone());

        if inner.script.hung_topics.contains(&request.topic()) {
            return Reply::Never;
        }

        match request {
            SignalingRequest::JoinRoom(_) => {
                let response = JoinRoomResponse {
                    router_capabilities: inner.script.router_capabilities.clone(),
                    existing: inner.script.existing.clone(),
                };
                Reply::Now(Ok(serde_json::to_value(response).unwrap()))
            }
            SignalingRequest::RequestTransport(request) => {
                if let signaling_protocol::TransportRequest::Consumer { audio_pid } = request {
                    if inner.script.failed_transport_owners.contains(audio_pid) {
                        return Reply::Now(Err(SignalingError::InvalidResponse {
                            topic: "requestTransport",
                            reason: format!("no router for {audio_pid}"),
                        }));
                    }
                }
                inner.transport_counter += 1;
                let params = TransportParameters {
                    id: format!("transport-{}", inner.transport_counter),
                    ice_parameters: json!({"usernameFragment": "mock", "password": "mock"}),
                    ice_candidates: vec![],
                    dtls_parameters: DtlsParameters(json!({"role": "auto", "fingerprints": []})),
                };
                Reply::Now(Ok(serde_json::to_value(params).unwrap()))
            }
            SignalingRequest::ConnectTransport(request) => {
                let owner_rejected = request.direction == TransportDirection::Receive
                    && request
                        .audio_pid
                        .as_ref()
                        .is_some_and(|pid| inner.script.rejected_connect_owners.contains(pid));
                let response = if owner_rejected {
                    "dtls failed".to_string()
                } else {
                    inner
                        .script
                        .connect_rejection
                        .clone()
                        .unwrap_or_else(|| "success".to_string())
                };
                Reply::Now(Ok(json!(response)))
            }
            SignalingRequest::StartProducing(request) => {
                if inner.script.rejected_produce.contains(&request.kind) {
                    return Reply::Now(Ok(json!("error")));
                }
                inner.producer_counter += 1;
                Reply::Now(Ok(json!(format!(
                    "local-{}-{}",
                    request.kind, inner.producer_counter
                ))))
            }
            SignalingRequest::ConsumeMedia(request) => {
                if inner.script.hung_consumes.contains(&request.pid) {
                    return Reply::Never;
                }
                let payload = match inner.script.unavailable.get(&request.pid) {
                    Some(reason) => serde_json::to_value(reason).unwrap(),
                    None => serde_json::to_value(ConsumerParameters {
                        id: format!("consumer-{}", request.pid),
                        producer_id: request.pid.clone(),
                        kind: request.kind,
                        rtp_parameters: RtpParameters(json!({"codecs": []})),
                    })
                    .unwrap(),
                };
                match inner.script.consume_delays.get(&request.pid) {
                    Some(delay) => Reply::After(*delay, payload),
                    None => Reply::Now(Ok(payload)),
                }
            }
            SignalingRequest::UnpauseConsumer(_) => Reply::Now(Ok(json!({}))),
        }
    }
}

#[async_trait]
impl SignalingChannel for MockSignaling {
    async fn request(&self, request: SignalingRequest) -> Result<Value, SignalingError> {
        match self.reply(&request) {
            Reply::Now(result) => result,
            Reply::After(delay, payload) => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
            Reply::Never => std::future::pending().await,
        }
    }

    fn notify(&self, notification: SignalingNotification) -> Result<(), SignalingError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.script.notifications_closed {
            return Err(SignalingError::ChannelClosed);
        }
        inner.notifications.push(notification);
        Ok(())
    }
}

/// Builder for MockSignaling configuration.
#[derive(Debug, Default)]
pub struct MockSignalingBuilder {
    script: Script,
}

impl MockSignalingBuilder {
    /// Participants announced in the `joinRoom` response.
    #[must_use]
    pub fn with_existing(mut self, batch: ConsumeBatch) -> Self {
        self.script.existing = batch;
        self
    }

    /// Router capabilities returned on join.
    #[must_use]
    pub fn with_router_capabilities(mut self, caps: RouterCapabilities) -> Self {
        self.script.router_capabilities = caps;
        self
    }

    /// Answer every `connectTransport` with `reason` instead of `"success"`.
    #[must_use]
    pub fn reject_connect(mut self, reason: &str) -> Self {
        self.script.connect_rejection = Some(reason.to_string());
        self
    }

    /// Reject `connectTransport` for the receive transport owned by `audio_id`.
    #[must_use]
    pub fn reject_connect_for(mut self, audio_id: &str) -> Self {
        self.script
            .rejected_connect_owners
            .insert(MediaId::new(audio_id));
        self
    }

    /// Fail `requestTransport` for the receive transport owned by `audio_id`.
    #[must_use]
    pub fn fail_transport_for(mut self, audio_id: &str) -> Self {
        self.script
            .failed_transport_owners
            .insert(MediaId::new(audio_id));
        self
    }

    /// Answer `startProducing` for `kind` with `"error"`.
    #[must_use]
    pub fn reject_produce(mut self, kind: MediaKind) -> Self {
        self.script.rejected_produce.insert(kind);
        self
    }

    /// Answer `consumeMedia` for `pid` with an unavailable sentinel.
    #[must_use]
    pub fn unavailable(mut self, pid: &str, reason: UnavailableReason) -> Self {
        self.script.unavailable.insert(MediaId::new(pid), reason);
        self
    }

    /// Never answer requests of `topic`.
    #[must_use]
    pub fn hang(mut self, topic: RequestTopic) -> Self {
        self.script.hung_topics.insert(topic);
        self
    }

    /// Never answer `consumeMedia` for `pid`.
    #[must_use]
    pub fn hang_consume(mut self, pid: &str) -> Self {
        self.script.hung_consumes.insert(MediaId::new(pid));
        self
    }

    /// Delay the `consumeMedia` answer for `pid`.
    #[must_use]
    pub fn delay_consume(mut self, pid: &str, delay: Duration) -> Self {
        self.script.consume_delays.insert(MediaId::new(pid), delay);
        self
    }

    /// Build the MockSignaling.
    #[must_use]
    pub fn build(self) -> MockSignaling {
        MockSignaling {
            inner: Arc::new(Mutex::new(MockSignalingInner {
                script: self.script,
                transport_counter: 0,
                producer_counter: 0,
                requests: Vec::new(),
                notifications: Vec::new(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signaling_protocol::{ConsumeMediaRequest, ConsumeOutcome, RtpCapabilities};

    fn consume(pid: &str) -> SignalingRequest {
        SignalingRequest::ConsumeMedia(ConsumeMediaRequest {
            rtp_capabilities: RtpCapabilities::default(),
            pid: MediaId::new(pid),
            kind: MediaKind::Audio,
        })
    }

    #[tokio::test]
    async fn test_consume_sentinel_and_parameters() {
        let mock = MockSignaling::builder()
            .unavailable("a1", UnavailableReason::CannotConsume)
            .build();

        let sentinel: ConsumeOutcome =
            serde_json::from_value(mock.request(consume("a1")).await.unwrap()).unwrap();
        assert_eq!(
            sentinel,
            ConsumeOutcome::Unavailable(UnavailableReason::CannotConsume)
        );

        let ready: ConsumeOutcome =
            serde_json::from_value(mock.request(consume("a2")).await.unwrap()).unwrap();
        assert!(matches!(ready, ConsumeOutcome::Ready(p) if p.producer_id.as_str() == "a2"));

        assert_eq!(mock.request_count(RequestTopic::ConsumeMedia), 2);
        assert_eq!(mock.consume_requests_for("a1"), 1);
    }

    #[test]
    fn test_closed_notifications_fail() {
        let mock = MockSignaling::accepting();
        let mute = SignalingNotification::AudioChange(signaling_protocol::MuteState::Mute);

        mock.notify(mute.clone()).unwrap();
        mock.close_notifications();
        assert!(mock.notify(mute).is_err());
        assert_eq!(mock.notifications().len(), 1);
    }
}
