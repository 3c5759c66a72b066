//! Outbound media: the send transport and local producers.

use super::transport::Transport;
use crate::engine::{EngineSender, MediaEngine, MediaStream, MediaTrack};
use crate::errors::SessionError;
use crate::observability::metrics;
use crate::signaling::SignalingClient;
use common::types::{MediaId, MediaKind, TransportDirection};
use signaling_protocol::{
    MuteState, ProduceOutcome, SignalingNotification, StartProducingRequest, TransportRequest,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Producer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Active,
    Paused,
    Closed,
}

/// One local track registered with the peer.
pub struct Producer {
    id: MediaId,
    track: MediaTrack,
    sender: Box<dyn EngineSender>,
    state: ProducerState,
}

impl Producer {
    /// Server-assigned id; this is the local participant's media id.
    #[must_use]
    pub fn id(&self) -> &MediaId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.track.kind
    }

    #[must_use]
    pub fn track(&self) -> &MediaTrack {
        &self.track
    }

    #[must_use]
    pub const fn state(&self) -> ProducerState {
        self.state
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state == ProducerState::Paused
    }

    /// Returns whether the state changed.
    fn pause(&mut self) -> bool {
        if self.state != ProducerState::Active {
            return false;
        }
        self.sender.set_paused(true);
        self.state = ProducerState::Paused;
        true
    }

    /// Returns whether the state changed.
    fn resume(&mut self) -> bool {
        if self.state != ProducerState::Paused {
            return false;
        }
        self.sender.set_paused(false);
        self.state = ProducerState::Active;
        true
    }

    fn close(&mut self) {
        if self.state != ProducerState::Closed {
            self.sender.close();
            self.state = ProducerState::Closed;
        }
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.id)
            .field("track", &self.track)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Produce `track` on this send transport.
    ///
    /// Runs the connect handshake if needed, then registers the new sender
    /// with the peer. The sender is closed if registration fails.
    ///
    /// # Errors
    ///
    /// - `SessionError::TransportConnect` if the handshake fails
    /// - `SessionError::ProduceRegistration` if the peer does not assign an id
    pub async fn produce(&self, track: MediaTrack) -> Result<Producer, SessionError> {
        if self.direction() != TransportDirection::Send {
            return Err(SessionError::Internal(
                "produce on a receive transport".to_string(),
            ));
        }

        self.ensure_connected().await?;

        let kind = track.kind;
        let sender = self.engine().send(&track).await.map_err(|e| {
            metrics::record_produce(kind.as_str(), "error");
            SessionError::Engine(e)
        })?;

        let request = StartProducingRequest {
            kind,
            rtp_parameters: sender.rtp_parameters(),
        };

        let reason = match self.signaling().start_producing(request).await {
            Ok(ProduceOutcome::Assigned(id)) => {
                metrics::record_produce(kind.as_str(), "success");
                info!(target: "sfu.producer", producer_id = %id, kind = kind.as_str(), "Producer registered");
                return Ok(Producer {
                    id,
                    track,
                    sender,
                    state: ProducerState::Active,
                });
            }
            Ok(ProduceOutcome::Rejected) => {
                metrics::record_produce(kind.as_str(), "rejected");
                "peer rejected producer".to_string()
            }
            Err(e) => {
                metrics::record_produce(kind.as_str(), "error");
                e.to_string()
            }
        };

        sender.close();
        warn!(target: "sfu.producer", kind = kind.as_str(), reason = %reason, "Producer registration failed");
        Err(SessionError::ProduceRegistration { kind, reason })
    }
}

/// Creates the single outbound transport.
#[derive(Clone)]
pub struct ProducerTransportManager {
    signaling: SignalingClient,
    engine: Arc<dyn MediaEngine>,
}

impl ProducerTransportManager {
    #[must_use]
    pub fn new(signaling: SignalingClient, engine: Arc<dyn MediaEngine>) -> Self {
        Self { signaling, engine }
    }

    /// `requestTransport{producer}`, then a local send transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the engine cannot build the
    /// transport (for example before capabilities are loaded).
    #[instrument(skip_all, name = "sfu.producer.create_transport")]
    pub async fn create_producer_transport(&self) -> Result<Arc<Transport>, SessionError> {
        let params = self
            .signaling
            .request_transport(TransportRequest::Producer)
            .await?;
        let engine_transport = self.engine.create_send_transport(&params)?;

        debug!(target: "sfu.producer", transport_id = %params.id, "Send transport created");

        Ok(Arc::new(Transport::new(
            engine_transport,
            TransportDirection::Send,
            None,
            self.signaling.clone(),
        )))
    }
}

/// A registered video and audio pair, not yet owned by a registry.
#[derive(Debug)]
pub struct LocalProducers {
    video: Producer,
    audio: Producer,
}

impl LocalProducers {
    #[must_use]
    pub fn video(&self) -> &Producer {
        &self.video
    }

    #[must_use]
    pub fn audio(&self) -> &Producer {
        &self.audio
    }

    /// Close both producers.
    pub fn close(&mut self) {
        self.video.close();
        self.audio.close();
    }
}

/// At most one audio and one video producer for the session.
pub struct ProducerRegistry {
    signaling: SignalingClient,
    audio: Option<Producer>,
    video: Option<Producer>,
}

impl ProducerRegistry {
    #[must_use]
    pub fn new(signaling: SignalingClient) -> Self {
        Self {
            signaling,
            audio: None,
            video: None,
        }
    }

    #[must_use]
    pub fn audio(&self) -> Option<&Producer> {
        self.audio.as_ref()
    }

    #[must_use]
    pub fn video(&self) -> Option<&Producer> {
        self.video.as_ref()
    }

    /// Whether any producer is registered.
    #[must_use]
    pub fn is_producing(&self) -> bool {
        self.audio.is_some() || self.video.is_some()
    }

    /// The local participant's audio id, once audio is registered.
    #[must_use]
    pub fn local_audio_id(&self) -> Option<&MediaId> {
        self.audio.as_ref().map(Producer::id)
    }

    /// Produce the first video track, then the first audio track, of
    /// `local_stream` on `transport`, and keep both producers.
    ///
    /// # Errors
    ///
    /// - `SessionError::FeedAlreadySent` if producers already exist
    /// - any error from [`ProducerRegistry::produce_feed`]
    pub async fn create_producers(
        &mut self,
        transport: &Transport,
        local_stream: &MediaStream,
    ) -> Result<(), SessionError> {
        if self.is_producing() {
            return Err(SessionError::FeedAlreadySent);
        }
        let producers = Self::produce_feed(transport, local_stream).await?;
        self.install(producers)
    }

    /// Register video then audio without touching any registry.
    ///
    /// Both tracks are checked before anything is sent. If audio fails after
    /// video succeeded, the video producer is closed so a retry starts clean.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoTrackAvailable` if a kind is missing from the stream
    /// - any error from [`Transport::produce`]
    #[instrument(skip_all, name = "sfu.producer.produce_feed", fields(transport_id = %transport.id()))]
    pub async fn produce_feed(
        transport: &Transport,
        local_stream: &MediaStream,
    ) -> Result<LocalProducers, SessionError> {
        let video_track = local_stream
            .first_track(MediaKind::Video)
            .cloned()
            .ok_or(SessionError::NoTrackAvailable(MediaKind::Video))?;
        let audio_track = local_stream
            .first_track(MediaKind::Audio)
            .cloned()
            .ok_or(SessionError::NoTrackAvailable(MediaKind::Audio))?;

        let mut video = transport.produce(video_track).await?;
        let audio = match transport.produce(audio_track).await {
            Ok(audio) => audio,
            Err(e) => {
                video.close();
                return Err(e);
            }
        };

        info!(
            target: "sfu.producer",
            audio_id = %audio.id(),
            video_id = %video.id(),
            "Local feed producing"
        );

        Ok(LocalProducers { video, audio })
    }

    /// Keep producers registered by [`ProducerRegistry::produce_feed`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::FeedAlreadySent` if producers already exist;
    /// the rejected producers are closed.
    pub fn install(&mut self, mut producers: LocalProducers) -> Result<(), SessionError> {
        if self.is_producing() {
            producers.close();
            return Err(SessionError::FeedAlreadySent);
        }
        self.video = Some(producers.video);
        self.audio = Some(producers.audio);
        Ok(())
    }

    fn producer_mut(&mut self, kind: MediaKind) -> Option<&mut Producer> {
        match kind {
            MediaKind::Audio => self.audio.as_mut(),
            MediaKind::Video => self.video.as_mut(),
        }
    }

    /// Pause the producer of `kind` and notify the peer (best effort).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::FeedNotSent` if no producer of `kind` exists.
    pub fn pause(&mut self, kind: MediaKind) -> Result<(), SessionError> {
        let producer = self.producer_mut(kind).ok_or(SessionError::FeedNotSent)?;
        if producer.pause() {
            self.signaling
                .notify(SignalingNotification::for_kind(kind, MuteState::Mute));
        }
        Ok(())
    }

    /// Resume the producer of `kind` and notify the peer (best effort).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::FeedNotSent` if no producer of `kind` exists.
    pub fn resume(&mut self, kind: MediaKind) -> Result<(), SessionError> {
        let producer = self.producer_mut(kind).ok_or(SessionError::FeedNotSent)?;
        if producer.resume() {
            self.signaling
                .notify(SignalingNotification::for_kind(kind, MuteState::Unmute));
        }
        Ok(())
    }

    /// Flip audio between paused and active. Returns the new muted state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::FeedNotSent` if audio is not being produced.
    pub fn toggle_mute(&mut self) -> Result<bool, SessionError> {
        let muted = self
            .audio
            .as_ref()
            .ok_or(SessionError::FeedNotSent)?
            .is_paused();

        if muted {
            self.resume(MediaKind::Audio)?;
        } else {
            self.pause(MediaKind::Audio)?;
        }
        Ok(!muted)
    }

    /// Close both producers.
    pub fn close_all(&mut self) {
        for producer in [self.audio.as_mut(), self.video.as_mut()].into_iter().flatten() {
            producer.close();
        }
    }
}
