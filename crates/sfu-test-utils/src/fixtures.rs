//! Pre-configured test data fixtures for SFU client testing.
//!
//! Provides builders for:
//! - Remote participants and consume batches
//! - Router capabilities the mock engine accepts
//! - Channel event pairs for driving a session actor

use common::types::MediaId;
use serde_json::json;
use sfu_client::projection::ParticipantView;
use sfu_client::signaling::{ChannelEvent, CHANNEL_EVENT_CAPACITY};
use signaling_protocol::{ConsumeBatch, RouterCapabilities};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How long [`wait_for_view`] waits before failing the test.
pub const VIEW_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    /// Audio production id (registry key).
    pub audio_id: MediaId,
    /// Video production id, if any.
    pub video_id: Option<MediaId>,
    /// Display name.
    pub display_name: String,
}

impl TestParticipant {
    /// Audio-only participant named after its audio id.
    #[must_use]
    pub fn new(audio_id: &str) -> Self {
        Self {
            audio_id: MediaId::new(audio_id),
            video_id: None,
            display_name: format!("User {audio_id}"),
        }
    }

    /// Add a video production.
    #[must_use]
    pub fn with_video(mut self, video_id: &str) -> Self {
        self.video_id = Some(MediaId::new(video_id));
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Builder for [`ConsumeBatch`] parallel arrays.
#[derive(Debug, Clone, Default)]
pub struct TestBatch {
    participants: Vec<TestParticipant>,
}

impl TestBatch {
    /// Create an empty batch builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a participant.
    #[must_use]
    pub fn participant(mut self, participant: TestParticipant) -> Self {
        self.participants.push(participant);
        self
    }

    /// Build the batch.
    #[must_use]
    pub fn build(self) -> ConsumeBatch {
        ConsumeBatch {
            audio_ids_to_create: self
                .participants
                .iter()
                .map(|p| p.audio_id.clone())
                .collect(),
            video_ids_to_create: self
                .participants
                .iter()
                .map(|p| p.video_id.clone())
                .collect(),
            display_names: self
                .participants
                .into_iter()
                .map(|p| p.display_name)
                .collect(),
        }
    }
}

/// Router capabilities with one audio and one video codec.
#[must_use]
pub fn router_capabilities() -> RouterCapabilities {
    RouterCapabilities(json!({
        "codecs": [
            {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
            {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
        ],
        "headerExtensions": []
    }))
}

/// Channel event pair as handed to `SessionActor::spawn`.
#[must_use]
pub fn channel_events() -> (mpsc::Sender<ChannelEvent>, mpsc::Receiver<ChannelEvent>) {
    mpsc::channel(CHANNEL_EVENT_CAPACITY)
}

/// Wait until the view satisfies `predicate`, panicking after
/// [`VIEW_WAIT_TIMEOUT`].
pub async fn wait_for_view<F>(
    view: &mut watch::Receiver<ParticipantView>,
    predicate: F,
) -> ParticipantView
where
    F: FnMut(&ParticipantView) -> bool,
{
    let waited = tokio::time::timeout(VIEW_WAIT_TIMEOUT, view.wait_for(predicate))
        .await
        .expect("timed out waiting for participant view");
    waited.expect("session ended while waiting for view").clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_builder_aligns_arrays() {
        let batch = TestBatch::new()
            .participant(TestParticipant::new("a1").with_video("v1").with_name("Alice"))
            .participant(TestParticipant::new("a2"))
            .build();

        let entries = batch.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].video_id, Some(MediaId::new("v1")));
        assert_eq!(entries[0].display_name, "Alice");
        assert_eq!(entries[1].video_id, None);
        assert_eq!(entries[1].display_name, "User a2");
    }
}
