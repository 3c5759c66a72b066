//! Media engine seam.
//!
//! The engine owns everything below signaling: ICE, DTLS, SRTP and RTP. The
//! session core drives it through these traits and never looks inside the
//! parameter blobs it passes along. The connect handshake is explicit: the
//! core asks a transport for its local DTLS parameters, forwards them to the
//! peer, and calls [`EngineTransport::complete_connect`] on success.

mod headless;

pub use headless::{HeadlessEngine, SUPPORTED_CODECS};

use crate::errors::EngineError;
use async_trait::async_trait;
use common::types::MediaKind;
use signaling_protocol::{
    ConsumerParameters, DtlsParameters, RouterCapabilities, RtpCapabilities, RtpParameters,
    TransportParameters,
};
use std::sync::Arc;

/// Handle to one engine track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

impl MediaTrack {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// A playable stream of one or more tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Wrap existing tracks under a known stream id.
    #[must_use]
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Combine tracks into a fresh stream with a generated id.
    #[must_use]
    pub fn combined(tracks: Vec<MediaTrack>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), tracks)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// First track of `kind`, if any.
    #[must_use]
    pub fn first_track(&self, kind: MediaKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    #[must_use]
    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.first_track(kind).is_some()
    }
}

/// Platform media capabilities.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load router capabilities and return the local device capabilities.
    ///
    /// Called at most once per engine; a second call is rejected.
    async fn load(
        &self,
        router_capabilities: &RouterCapabilities,
    ) -> Result<RtpCapabilities, EngineError>;

    /// Build the local half of the outbound transport.
    fn create_send_transport(
        &self,
        params: &TransportParameters,
    ) -> Result<Arc<dyn EngineTransport>, EngineError>;

    /// Build the local half of an inbound transport.
    fn create_receive_transport(
        &self,
        params: &TransportParameters,
    ) -> Result<Arc<dyn EngineTransport>, EngineError>;

    /// Acquire local capture (camera and microphone).
    async fn capture_local_media(&self) -> Result<MediaStream, EngineError>;
}

/// Local half of one transport.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Server-side transport id this transport was built from.
    fn id(&self) -> &str;

    /// Local DTLS parameters to send in `connectTransport`.
    async fn local_dtls_parameters(&self) -> Result<DtlsParameters, EngineError>;

    /// Finish connecting after the peer accepted our DTLS parameters.
    async fn complete_connect(&self) -> Result<(), EngineError>;

    /// Start sending `track`. The connect handshake must already be done.
    async fn send(&self, track: &MediaTrack) -> Result<Box<dyn EngineSender>, EngineError>;

    /// Start receiving the production described by `params`.
    async fn receive(
        &self,
        params: &ConsumerParameters,
    ) -> Result<Box<dyn EngineReceiver>, EngineError>;

    /// Tear down the transport and everything on it.
    fn close(&self);
}

/// Local sender for one produced track.
pub trait EngineSender: Send + Sync {
    /// RTP parameters to register with the peer.
    fn rtp_parameters(&self) -> RtpParameters;

    fn set_paused(&self, paused: bool);

    fn close(&self);
}

/// Local receiver for one consumed track.
pub trait EngineReceiver: Send + Sync {
    /// Playable track carrying the remote media.
    fn track(&self) -> MediaTrack;

    fn close(&self);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_stream_gets_fresh_id() {
        let tracks = vec![MediaTrack::new("t-audio", MediaKind::Audio)];
        let a = MediaStream::combined(tracks.clone());
        let b = MediaStream::combined(tracks);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.tracks(), b.tracks());
        assert!(uuid::Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn test_first_track_by_kind() {
        let stream = MediaStream::new(
            "local",
            vec![
                MediaTrack::new("v0", MediaKind::Video),
                MediaTrack::new("a0", MediaKind::Audio),
                MediaTrack::new("v1", MediaKind::Video),
            ],
        );

        assert_eq!(stream.first_track(MediaKind::Video).unwrap().id, "v0");
        assert_eq!(stream.first_track(MediaKind::Audio).unwrap().id, "a0");
        assert_eq!(stream.track_count(), 3);

        let video_only = MediaStream::new("cam", vec![MediaTrack::new("v0", MediaKind::Video)]);
        assert!(!video_only.has_kind(MediaKind::Audio));
    }
}
