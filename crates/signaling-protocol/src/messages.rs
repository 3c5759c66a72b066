//! Signaling message schema.
//!
//! Field names follow the signaling peer's camelCase JSON. Engine-specific
//! parameter blobs (capabilities, RTP and DTLS parameters) are carried as
//! opaque JSON values: the client forwards them between the peer and the
//! media engine without interpreting them.

use common::types::{MediaId, MediaKind, TransportDirection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display name used when the peer omits one for a batch entry.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

// ----------------------------------------------------------------------------
// Opaque engine parameters
// ----------------------------------------------------------------------------

/// Router RTP capabilities announced by the SFU on join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterCapabilities(pub Value);

/// Local device RTP capabilities, produced by loading router capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

/// RTP send/receive parameters for one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

/// DTLS parameters (role + certificate fingerprints).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub Value);

/// Server-side transport parameters used to build a local transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportParameters {
    /// Server-side transport id.
    pub id: String,
    /// ICE username fragment and password.
    #[serde(default)]
    pub ice_parameters: Value,
    /// Server ICE candidates.
    #[serde(default)]
    pub ice_candidates: Vec<Value>,
    /// Server DTLS parameters.
    #[serde(default)]
    pub dtls_parameters: DtlsParameters,
}

/// Parameters for building one local consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParameters {
    /// Server-side consumer id.
    pub id: String,
    /// The production being consumed.
    pub producer_id: MediaId,
    /// Media kind.
    pub kind: MediaKind,
    /// Receive-side RTP parameters.
    #[serde(default)]
    pub rtp_parameters: RtpParameters,
}

// ----------------------------------------------------------------------------
// Consume batches
// ----------------------------------------------------------------------------

/// Remote productions to consume, as index-aligned parallel arrays.
///
/// Index `i` describes one remote participant: its audio id, optional video
/// id and display name. Audio ids drive the batch; a short or `null` video
/// entry means the participant has no video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeBatch {
    /// Audio ids, one per remote participant.
    #[serde(default, alias = "audioPidsToCreate")]
    pub audio_ids_to_create: Vec<MediaId>,
    /// Video ids aligned with `audio_ids_to_create`.
    #[serde(default, alias = "videoPidsToCreate")]
    pub video_ids_to_create: Vec<Option<MediaId>>,
    /// Display names aligned with `audio_ids_to_create`.
    #[serde(default, alias = "associatedUserNames")]
    pub display_names: Vec<String>,
}

/// One participant described by a [`ConsumeBatch`] index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Index within the batch.
    pub index: usize,
    /// Audio id (registry key).
    pub audio_id: MediaId,
    /// Video id, if the participant produces video.
    pub video_id: Option<MediaId>,
    /// Display name.
    pub display_name: String,
}

impl ConsumeBatch {
    /// Number of participants in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.audio_ids_to_create.len()
    }

    /// Whether the batch describes no participants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio_ids_to_create.is_empty()
    }

    /// Zip the parallel arrays into per-participant entries.
    #[must_use]
    pub fn entries(&self) -> Vec<BatchEntry> {
        self.audio_ids_to_create
            .iter()
            .enumerate()
            .map(|(index, audio_id)| BatchEntry {
                index,
                audio_id: audio_id.clone(),
                video_id: self.video_ids_to_create.get(index).cloned().flatten(),
                display_name: self
                    .display_names
                    .get(index)
                    .filter(|name| !name.is_empty())
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            })
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// `joinRoom` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Local participant's display name.
    #[serde(alias = "userName")]
    pub display_name: String,
    /// Room to join.
    #[serde(alias = "roomName")]
    pub room_id: String,
}

/// `joinRoom` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    /// Router capabilities to load into the media engine.
    #[serde(alias = "routerRtpCapabilities")]
    pub router_capabilities: RouterCapabilities,
    /// Participants already producing in the room.
    #[serde(flatten)]
    pub existing: ConsumeBatch,
}

/// `requestTransport` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportRequest {
    /// The single outbound transport.
    Producer,
    /// An inbound transport for one remote participant.
    Consumer {
        /// Remote participant's audio id.
        #[serde(rename = "audioPid")]
        audio_pid: MediaId,
    },
}

/// `connectTransport` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    /// Locally generated DTLS parameters.
    pub dtls_parameters: DtlsParameters,
    /// Transport direction, named after the local role.
    #[serde(rename = "type")]
    pub direction: TransportDirection,
    /// Owning remote participant's audio id (receive transports only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_pid: Option<MediaId>,
}

/// `startProducing` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartProducingRequest {
    /// Kind of the new producer.
    pub kind: MediaKind,
    /// Send-side RTP parameters from the engine.
    pub rtp_parameters: RtpParameters,
}

/// `consumeMedia` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeMediaRequest {
    /// Local device capabilities.
    pub rtp_capabilities: RtpCapabilities,
    /// Production to consume.
    pub pid: MediaId,
    /// Kind of the production.
    pub kind: MediaKind,
}

/// `unpauseConsumer` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpauseConsumerRequest {
    /// Production whose consumer should resume.
    pub pid: MediaId,
    /// Kind of the production.
    pub kind: MediaKind,
}

/// Request topic, used for timeouts, metric labels and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTopic {
    JoinRoom,
    RequestTransport,
    ConnectTransport,
    StartProducing,
    ConsumeMedia,
    UnpauseConsumer,
}

impl RequestTopic {
    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestTopic::JoinRoom => "joinRoom",
            RequestTopic::RequestTransport => "requestTransport",
            RequestTopic::ConnectTransport => "connectTransport",
            RequestTopic::StartProducing => "startProducing",
            RequestTopic::ConsumeMedia => "consumeMedia",
            RequestTopic::UnpauseConsumer => "unpauseConsumer",
        }
    }
}

/// A request expecting exactly one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "camelCase")]
pub enum SignalingRequest {
    JoinRoom(JoinRoomRequest),
    RequestTransport(TransportRequest),
    ConnectTransport(ConnectTransportRequest),
    StartProducing(StartProducingRequest),
    ConsumeMedia(ConsumeMediaRequest),
    UnpauseConsumer(UnpauseConsumerRequest),
}

impl SignalingRequest {
    /// Topic of this request.
    #[must_use]
    pub const fn topic(&self) -> RequestTopic {
        match self {
            SignalingRequest::JoinRoom(_) => RequestTopic::JoinRoom,
            SignalingRequest::RequestTransport(_) => RequestTopic::RequestTransport,
            SignalingRequest::ConnectTransport(_) => RequestTopic::ConnectTransport,
            SignalingRequest::StartProducing(_) => RequestTopic::StartProducing,
            SignalingRequest::ConsumeMedia(_) => RequestTopic::ConsumeMedia,
            SignalingRequest::UnpauseConsumer(_) => RequestTopic::UnpauseConsumer,
        }
    }
}

// ----------------------------------------------------------------------------
// Responses
// ----------------------------------------------------------------------------

/// `connectTransport` response: the literal `"success"`, anything else fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectOutcome {
    Success,
    Failed(String),
}

impl From<String> for ConnectOutcome {
    fn from(value: String) -> Self {
        if value == "success" {
            ConnectOutcome::Success
        } else {
            ConnectOutcome::Failed(value)
        }
    }
}

impl From<ConnectOutcome> for String {
    fn from(value: ConnectOutcome) -> Self {
        match value {
            ConnectOutcome::Success => "success".to_string(),
            ConnectOutcome::Failed(reason) => reason,
        }
    }
}

/// `startProducing` response: the assigned id, or the literal `"error"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProduceOutcome {
    Assigned(MediaId),
    Rejected,
}

impl From<String> for ProduceOutcome {
    fn from(value: String) -> Self {
        if value == "error" || value.is_empty() {
            ProduceOutcome::Rejected
        } else {
            ProduceOutcome::Assigned(MediaId::new(value))
        }
    }
}

impl From<ProduceOutcome> for String {
    fn from(value: ProduceOutcome) -> Self {
        match value {
            ProduceOutcome::Assigned(id) => id.as_str().to_string(),
            ProduceOutcome::Rejected => "error".to_string(),
        }
    }
}

/// Sentinel reasons a `consumeMedia` request yields no consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    /// Router cannot serve this production to our capabilities.
    #[serde(rename = "cannotConsume", alias = "cannot-consume")]
    CannotConsume,
    /// Server-side consumer creation failed.
    #[serde(rename = "consumeFailed", alias = "consume-failed")]
    ConsumeFailed,
}

impl UnavailableReason {
    /// Returns the reason as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::CannotConsume => "cannot_consume",
            UnavailableReason::ConsumeFailed => "consume_failed",
        }
    }
}

/// `consumeMedia` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsumeOutcome {
    Unavailable(UnavailableReason),
    Ready(ConsumerParameters),
}

// ----------------------------------------------------------------------------
// Notifications and push events
// ----------------------------------------------------------------------------

/// Local mute transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteState {
    Mute,
    Unmute,
}

/// Fire-and-forget notifications to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "camelCase")]
pub enum SignalingNotification {
    AudioChange(MuteState),
    VideoChange(MuteState),
}

impl SignalingNotification {
    /// Build the notification for a producer of `kind` changing state.
    #[must_use]
    pub const fn for_kind(kind: MediaKind, state: MuteState) -> Self {
        match kind {
            MediaKind::Audio => SignalingNotification::AudioChange(state),
            MediaKind::Video => SignalingNotification::VideoChange(state),
        }
    }
}

/// Events pushed by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "camelCase")]
pub enum SignalingEvent {
    /// Ordered audio ids of the current active speakers.
    #[serde(alias = "updateActiveSpeakers")]
    ActiveSpeakerUpdate(Vec<MediaId>),
    /// New remote productions to consume.
    NewProducersToConsume(ConsumeBatch),
}
