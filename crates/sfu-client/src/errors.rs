//! SFU client error types.
//!
//! `SessionError` is what the view boundary sees. Detailed reasons are kept
//! for logs and diagnostics; `user_message()` is the only text meant for an
//! end user and never carries peer-supplied or internal detail.

use common::types::{MediaId, MediaKind, TransportDirection};
use signaling_protocol::CodecError;
use thiserror::Error;

/// Errors raised by a signaling round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// No response within the per-topic timeout.
    #[error("Request {topic} timed out after {timeout_ms}ms")]
    Timeout { topic: &'static str, timeout_ms: u64 },

    /// The channel is closed or the peer disconnected mid-request.
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// The outbound queue is full (notifications only).
    #[error("Signaling channel backlogged")]
    Backlogged,

    /// The response payload does not match the topic's schema.
    #[error("Invalid {topic} response: {reason}")]
    InvalidResponse { topic: &'static str, reason: String },

    /// Frame encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<CodecError> for SignalingError {
    fn from(err: CodecError) -> Self {
        SignalingError::Codec(err.to_string())
    }
}

impl SignalingError {
    /// Whether this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, SignalingError::Timeout { .. })
    }
}

/// Errors raised by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Router capabilities share nothing usable with the engine.
    #[error("Incompatible router capabilities: {0}")]
    IncompatibleCapabilities(String),

    /// `load` was already called for this engine.
    #[error("Media engine already loaded")]
    AlreadyLoaded,

    /// A transport was requested before `load`.
    #[error("Media engine not loaded")]
    NotLoaded,

    /// Local transport operation failed.
    #[error("Engine transport error: {0}")]
    Transport(String),

    /// Local capture failed.
    #[error("Capture failed: {0}")]
    Capture(String),
}

/// SFU client session error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Router capabilities could not be loaded; the session cannot proceed.
    #[error("Capability load failed: {0}")]
    CapabilityLoad(EngineError),

    /// A transport's connect handshake failed; the transport is unusable.
    #[error("{direction} transport connect failed: {reason}")]
    TransportConnect {
        direction: TransportDirection,
        reason: String,
    },

    /// The peer did not register a local producer.
    #[error("{kind} producer registration failed: {reason}")]
    ProduceRegistration { kind: MediaKind, reason: String },

    /// One kind of media is not available for one remote participant.
    #[error("Cannot consume {kind} {pid}: {reason}")]
    ConsumeUnavailable {
        pid: MediaId,
        kind: MediaKind,
        reason: String,
    },

    /// The local capture stream has no track of this kind.
    #[error("No {0} track available")]
    NoTrackAvailable(MediaKind),

    /// Signaling round trip failed.
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Local media engine operation failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Operation requires a joined session.
    #[error("Session not joined")]
    NotJoined,

    /// `join` called twice.
    #[error("Session already joined")]
    AlreadyJoined,

    /// `send_feed` before `enable_capture`.
    #[error("Local capture not enabled")]
    CaptureNotEnabled,

    /// Operation requires local producers.
    #[error("Local feed not sent")]
    FeedNotSent,

    /// `send_feed` called while producers exist.
    #[error("Local feed already sent")]
    FeedAlreadySent,

    /// `send_feed` called while an earlier one is still negotiating.
    #[error("Local feed send in progress")]
    FeedInProgress,

    /// The session shut down before the operation finished.
    #[error("Session cancelled")]
    Cancelled,

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether the session can no longer make progress after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, SessionError::CapabilityLoad(_))
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::CapabilityLoad(_) => {
                "This device cannot join the call with the room's media settings".to_string()
            }
            SessionError::TransportConnect { .. } => "Could not connect media".to_string(),
            SessionError::ProduceRegistration { .. } => {
                "Could not share your camera and microphone, please try again".to_string()
            }
            SessionError::ConsumeUnavailable { kind, .. } => {
                format!("Remote {kind} is unavailable")
            }
            SessionError::NoTrackAvailable(kind) => format!("No {kind} device found"),
            SessionError::Signaling(e) if e.is_timeout() => {
                "The server took too long to respond".to_string()
            }
            SessionError::Signaling(_) => "Lost connection to the server".to_string(),
            SessionError::Engine(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SessionError::NotJoined => "Join the room first".to_string(),
            SessionError::AlreadyJoined => "Already in the room".to_string(),
            SessionError::CaptureNotEnabled => "Turn on your camera first".to_string(),
            SessionError::FeedNotSent => "Share your feed first".to_string(),
            SessionError::FeedAlreadySent => "Your feed is already shared".to_string(),
            SessionError::FeedInProgress => "Your feed is still being shared".to_string(),
            SessionError::Cancelled => "The call has ended".to_string(),
        }
    }

    /// Severity rank used when a participant fails for several reasons at once.
    pub(crate) const fn severity(&self) -> u8 {
        match self {
            SessionError::ConsumeUnavailable { .. } => 0,
            SessionError::Engine(_) | SessionError::Signaling(_) => 1,
            SessionError::TransportConnect { .. } => 2,
            _ => 3,
        }
    }
}
