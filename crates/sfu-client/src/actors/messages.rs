//! Message types for the session actor.
//!
//! Requests carry a `oneshot` reply channel; the actor answers each one
//! exactly once.

use crate::engine::MediaStream;
use crate::errors::SessionError;
use common::types::MediaId;
use tokio::sync::oneshot;

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Join a room and start consuming existing participants.
    Join {
        display_name: String,
        room_id: String,
        respond_to: oneshot::Sender<Result<JoinSummary, SessionError>>,
    },

    /// Acquire local capture.
    EnableCapture {
        respond_to: oneshot::Sender<Result<MediaStream, SessionError>>,
    },

    /// Produce the local capture on the send transport.
    SendFeed {
        respond_to: oneshot::Sender<Result<LocalFeed, SessionError>>,
    },

    /// Flip local audio between muted and unmuted.
    ToggleMute {
        respond_to: oneshot::Sender<Result<bool, SessionError>>,
    },

    /// Get current session state.
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSummary {
    pub room_id: String,
    /// Participants already producing when we joined.
    pub existing_participants: usize,
    /// Unix timestamp (seconds).
    pub joined_at: i64,
}

/// Ids the peer assigned to the local feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFeed {
    pub audio_id: MediaId,
    pub video_id: MediaId,
}

/// Session state snapshot for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub room_id: Option<String>,
    pub joined_at: Option<i64>,
    pub registry_entries: usize,
    /// Consume batches still negotiating.
    pub pending_batches: usize,
    pub active_speakers: Option<Vec<MediaId>>,
    pub capture_enabled: bool,
    pub local_feed: Option<LocalFeed>,
    /// A `send_feed` is still negotiating.
    pub send_in_progress: bool,
    /// `None` until the local feed is sent.
    pub muted: Option<bool>,
    pub degraded: bool,
    /// Set after a session-ending failure.
    pub fatal_error: Option<String>,
}

impl SessionState {
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.room_id.is_some()
    }
}
