//! Wire envelope for signaling frames.

use crate::messages::{SignalingEvent, SignalingNotification, SignalingRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One signaling frame.
///
/// Frame format:
/// - Length: 4 bytes, big-endian, JSON body length
/// - Body: JSON object tagged by `type`
///
/// `request` and `response` frames share a correlation `id`; the response
/// payload is free-form JSON decoded by the requester according to the
/// request topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// Client request awaiting a response.
    Request {
        id: u64,
        request: SignalingRequest,
    },
    /// Peer response to the request with the same `id`.
    Response { id: u64, payload: Value },
    /// Client notification, never answered.
    Notification {
        notification: SignalingNotification,
    },
    /// Peer push event.
    Event { event: SignalingEvent },
}

impl Envelope {
    /// Length prefix size in bytes
    pub const LENGTH_PREFIX_SIZE: usize = 4;

    /// Maximum JSON body size in bytes (1 MiB)
    pub const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Short name of the frame type, for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => "request",
            Envelope::Response { .. } => "response",
            Envelope::Notification { .. } => "notification",
            Envelope::Event { .. } => "event",
        }
    }
}
