//! `SessionActor` - orchestrates one client session.
//!
//! The actor owns the producer side, holds the shared consumer registry and
//! reacts to three inputs:
//!
//! - requests from the view layer through [`SessionHandle`]
//! - channel events: push events and connection lifecycle
//! - registry upserts, which re-derive the participant view
//!
//! Consume batches and `send_feed` run in background tasks so the mailbox
//! never waits on a peer round trip. A batch task captures the negotiator
//! (engine, signaling, RTP capabilities, registry) at spawn time; a send task
//! hands its producers back through a completion the actor installs.

use super::messages::{JoinSummary, LocalFeed, SessionMessage, SessionState};
use crate::config::SessionConfig;
use crate::engine::{MediaEngine, MediaStream};
use crate::errors::{EngineError, SessionError};
use crate::media::{
    BatchReport, ConsumerNegotiator, ConsumerRegistry, ConsumerTransportManager, LocalProducers,
    ProducerRegistry, ProducerTransportManager, RegistryEvent, RegistrySnapshot, Transport,
    TransportState,
};
use crate::projection::{project_view, ParticipantView};
use crate::signaling::{ChannelEvent, SignalingChannel, SignalingClient};
use common::types::MediaId;
use signaling_protocol::{ConsumeBatch, JoinRoomRequest, SignalingEvent, DEFAULT_DISPLAY_NAME};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    view: watch::Receiver<ParticipantView>,
    registry: Arc<ConsumerRegistry>,
}

impl SessionHandle {
    /// Join `room_id` as `display_name`.
    ///
    /// An empty display name is replaced with "Anonymous".
    pub async fn join(
        &self,
        display_name: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Result<JoinSummary, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Join {
                display_name: display_name.into(),
                room_id: room_id.into(),
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Acquire local capture. Repeated calls return the same stream.
    pub async fn enable_capture(&self) -> Result<MediaStream, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::EnableCapture { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Produce the local capture.
    pub async fn send_feed(&self) -> Result<LocalFeed, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::SendFeed { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Toggle local audio. Returns the new muted state.
    pub async fn toggle_mute(&self) -> Result<bool, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::ToggleMute { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get current session state.
    pub async fn get_state(&self) -> Result<SessionState, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Observe the participant view.
    #[must_use]
    pub fn subscribe_view(&self) -> watch::Receiver<ParticipantView> {
        self.view.clone()
    }

    /// Observe registry changes.
    ///
    /// Every published or replaced participant is announced here, including
    /// those the active-speaker list keeps out of the view.
    #[must_use]
    pub fn subscribe_registry(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.subscribe()
    }

    /// Read-only snapshot of the consumer registry.
    pub async fn registry_snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot().await
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Per-join state.
struct JoinedRoom {
    room_id: String,
    joined_at: i64,
    negotiator: ConsumerNegotiator,
}

/// Result of a background `send_feed`, installed by the actor.
struct SendCompletion {
    /// The send transport used, if one was obtained.
    transport: Option<Arc<Transport>>,
    result: Result<LocalProducers, SessionError>,
    respond_to: oneshot::Sender<Result<LocalFeed, SessionError>>,
}

/// The session actor.
pub struct SessionActor {
    config: SessionConfig,
    receiver: mpsc::Receiver<SessionMessage>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    channel_open: bool,
    registry_events: broadcast::Receiver<RegistryEvent>,
    cancel_token: CancellationToken,
    /// Parent of send tasks; cancelled at shutdown.
    task_token: CancellationToken,
    signaling: SignalingClient,
    engine: Arc<dyn MediaEngine>,
    registry: Arc<ConsumerRegistry>,
    producer_transports: ProducerTransportManager,
    producers: ProducerRegistry,
    send_transport: Option<Arc<Transport>>,
    local_stream: Option<MediaStream>,
    joined: Option<JoinedRoom>,
    fatal_error: Option<EngineError>,
    active_speakers: Option<Vec<MediaId>>,
    degraded: bool,
    batches: JoinSet<Option<BatchReport>>,
    send_tasks: JoinSet<SendCompletion>,
    view: watch::Sender<ParticipantView>,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// `channel_events` is the inbound side of `channel`: push events and
    /// lifecycle changes.
    pub fn spawn(
        config: SessionConfig,
        channel: Arc<dyn SignalingChannel>,
        channel_events: mpsc::Receiver<ChannelEvent>,
        engine: Arc<dyn MediaEngine>,
        cancel_token: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (view_tx, view_rx) = watch::channel(ParticipantView::not_joined());

        let signaling = SignalingClient::new(channel, config.timeouts);
        let registry = Arc::new(ConsumerRegistry::new());

        let actor = Self {
            config,
            receiver,
            channel_events,
            channel_open: true,
            registry_events: registry.subscribe(),
            task_token: cancel_token.child_token(),
            cancel_token: cancel_token.clone(),
            producer_transports: ProducerTransportManager::new(
                signaling.clone(),
                Arc::clone(&engine),
            ),
            producers: ProducerRegistry::new(signaling.clone()),
            signaling,
            engine,
            registry: Arc::clone(&registry),
            send_transport: None,
            local_stream: None,
            joined: None,
            fatal_error: None,
            active_speakers: None,
            degraded: false,
            batches: JoinSet::new(),
            send_tasks: JoinSet::new(),
            view: view_tx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            cancel_token,
            view: view_rx,
            registry,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sfu.actor.session")]
    async fn run(mut self) {
        info!(target: "sfu.session", "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "sfu.session", "SessionActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(target: "sfu.session", "SessionActor channel closed, exiting");
                            break;
                        }
                    }
                }

                event = self.channel_events.recv(), if self.channel_open => {
                    match event {
                        Some(event) => self.handle_channel_event(event).await,
                        None => {
                            self.channel_open = false;
                            self.set_degraded(true, "signaling event stream ended").await;
                        }
                    }
                }

                update = self.registry_events.recv() => {
                    match update {
                        Ok(_) => self.publish_view().await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(target: "sfu.session", skipped, "Registry events lagged, re-deriving view");
                            self.publish_view().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }

                Some(done) = self.batches.join_next(), if !self.batches.is_empty() => {
                    match done {
                        Ok(Some(report)) => {
                            for (audio_id, e) in &report.failed {
                                debug!(
                                    target: "sfu.session",
                                    audio_id = %audio_id,
                                    error = %e,
                                    "Participant not published"
                                );
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!(target: "sfu.session", error = %e, "Batch task failed"),
                    }
                }

                Some(done) = self.send_tasks.join_next(), if !self.send_tasks.is_empty() => {
                    match done {
                        Ok(completion) => self.finish_send_feed(completion).await,
                        Err(e) => error!(target: "sfu.session", error = %e, "Send feed task failed"),
                    }
                }
            }
        }

        self.graceful_shutdown().await;
        info!(target: "sfu.session", "SessionActor stopped");
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                display_name,
                room_id,
                respond_to,
            } => {
                let result = self.handle_join(display_name, room_id).await;
                let _ = respond_to.send(result);
            }
            SessionMessage::EnableCapture { respond_to } => {
                let result = self.handle_enable_capture().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::SendFeed { respond_to } => self.start_send_feed(respond_to),
            SessionMessage::ToggleMute { respond_to } => {
                let result = self.producers.toggle_mute();
                if let Ok(muted) = result {
                    info!(target: "sfu.session", muted, "Local audio toggled");
                }
                let _ = respond_to.send(result);
            }
            SessionMessage::GetState { respond_to } => {
                let state = self.state().await;
                let _ = respond_to.send(state);
            }
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn handle_join(
        &mut self,
        display_name: String,
        room_id: String,
    ) -> Result<JoinSummary, SessionError> {
        if let Some(e) = &self.fatal_error {
            return Err(SessionError::CapabilityLoad(e.clone()));
        }
        if self.joined.is_some() {
            return Err(SessionError::AlreadyJoined);
        }

        let display_name = if display_name.is_empty() {
            DEFAULT_DISPLAY_NAME.to_string()
        } else {
            display_name
        };

        let request = JoinRoomRequest {
            display_name,
            room_id: room_id.clone(),
        };
        let response = tokio::select! {
            response = self.signaling.join_room(request) => response?,
            () = self.cancel_token.cancelled() => return Err(SessionError::Cancelled),
        };

        let rtp_capabilities = match self.engine.load(&response.router_capabilities).await {
            Ok(caps) => caps,
            Err(e) => {
                error!(target: "sfu.session", error = %e, "Router capabilities rejected, session unusable");
                self.fatal_error = Some(e.clone());
                return Err(SessionError::CapabilityLoad(e));
            }
        };

        let negotiator = ConsumerNegotiator::new(
            ConsumerTransportManager::new(self.signaling.clone(), Arc::clone(&self.engine)),
            rtp_capabilities,
            Arc::clone(&self.registry),
        );

        let joined_at = chrono::Utc::now().timestamp();
        let existing_participants = response.existing.len();

        self.joined = Some(JoinedRoom {
            room_id: room_id.clone(),
            joined_at,
            negotiator,
        });

        info!(
            target: "sfu.session",
            existing_participants,
            "Joined room"
        );

        self.spawn_batch(response.existing);
        self.publish_view().await;

        Ok(JoinSummary {
            room_id,
            existing_participants,
            joined_at,
        })
    }

    async fn handle_enable_capture(&mut self) -> Result<MediaStream, SessionError> {
        if self.joined.is_none() {
            return Err(SessionError::NotJoined);
        }
        if let Some(stream) = &self.local_stream {
            return Ok(stream.clone());
        }

        let stream = self.engine.capture_local_media().await?;
        info!(
            target: "sfu.session",
            tracks = stream.track_count(),
            "Local capture enabled"
        );
        self.local_stream = Some(stream.clone());
        Ok(stream)
    }

    fn start_send_feed(&mut self, respond_to: oneshot::Sender<Result<LocalFeed, SessionError>>) {
        let stream = match self.send_feed_stream() {
            Ok(stream) => stream,
            Err(e) => {
                let _ = respond_to.send(Err(e));
                return;
            }
        };

        // A failed handshake is terminal; retries get a fresh transport
        let reusable = self
            .send_transport
            .as_ref()
            .filter(|t| !matches!(t.state(), TransportState::Failed | TransportState::Closed))
            .map(Arc::clone);
        let manager = self.producer_transports.clone();
        let token = self.task_token.child_token();

        debug!(
            target: "sfu.session",
            reuse_transport = reusable.is_some(),
            "Sending local feed"
        );

        self.send_tasks.spawn(async move {
            let transport = match reusable {
                Some(transport) => Ok(transport),
                None => tokio::select! {
                    created = manager.create_producer_transport() => created,
                    () = token.cancelled() => Err(SessionError::Cancelled),
                },
            };

            let (transport, result) = match transport {
                Ok(transport) => {
                    let result = tokio::select! {
                        produced = ProducerRegistry::produce_feed(&transport, &stream) => produced,
                        () = token.cancelled() => Err(SessionError::Cancelled),
                    };
                    (Some(transport), result)
                }
                Err(e) => (None, Err(e)),
            };

            SendCompletion {
                transport,
                result,
                respond_to,
            }
        });
    }

    /// Check `send_feed` preconditions and return the stream to produce.
    fn send_feed_stream(&self) -> Result<MediaStream, SessionError> {
        if self.joined.is_none() {
            return Err(SessionError::NotJoined);
        }
        let stream = self
            .local_stream
            .clone()
            .ok_or(SessionError::CaptureNotEnabled)?;
        if self.producers.is_producing() {
            return Err(SessionError::FeedAlreadySent);
        }
        if !self.send_tasks.is_empty() {
            return Err(SessionError::FeedInProgress);
        }
        Ok(stream)
    }

    async fn finish_send_feed(&mut self, completion: SendCompletion) {
        let SendCompletion {
            transport,
            result,
            respond_to,
        } = completion;

        if let Some(transport) = transport {
            let current = self
                .send_transport
                .as_ref()
                .is_some_and(|t| Arc::ptr_eq(t, &transport));
            if !current {
                if let Some(stale) = self.send_transport.replace(transport) {
                    stale.close();
                }
            }
        }

        let result = result
            .and_then(|producers| self.producers.install(producers))
            .and_then(|()| {
                self.local_feed().ok_or_else(|| {
                    SessionError::Internal("producers missing after registration".to_string())
                })
            });

        match &result {
            // Our own audio id now exists; drop it from the view
            Ok(_) => self.publish_view().await,
            Err(e) => warn!(target: "sfu.session", error = %e, "Local feed not sent"),
        }
        let _ = respond_to.send(result);
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.set_degraded(false, "signaling connected").await,
            ChannelEvent::Disconnected { reason } => self.set_degraded(true, &reason).await,
            ChannelEvent::Push(SignalingEvent::ActiveSpeakerUpdate(speakers)) => {
                debug!(target: "sfu.session", speakers = speakers.len(), "Active speakers updated");
                self.active_speakers = Some(speakers);
                self.publish_view().await;
            }
            ChannelEvent::Push(SignalingEvent::NewProducersToConsume(batch)) => {
                if self.joined.is_none() {
                    warn!(
                        target: "sfu.session",
                        size = batch.len(),
                        "New producers before join, dropping batch"
                    );
                    return;
                }
                self.spawn_batch(batch);
            }
        }
    }

    async fn set_degraded(&mut self, degraded: bool, reason: &str) {
        if self.degraded == degraded {
            return;
        }
        self.degraded = degraded;
        if degraded {
            warn!(target: "sfu.session", reason = %reason, "Signaling degraded");
        } else {
            info!(target: "sfu.session", reason = %reason, "Signaling restored");
        }
        self.publish_view().await;
    }

    fn spawn_batch(&mut self, batch: ConsumeBatch) {
        let Some(joined) = &self.joined else {
            return;
        };
        if batch.is_empty() {
            return;
        }

        let negotiator = joined.negotiator.clone();
        let token = self.cancel_token.child_token();
        self.batches.spawn(async move {
            tokio::select! {
                report = negotiator.consume_batch(batch) => Some(report),
                () = token.cancelled() => None,
            }
        });
    }

    /// Re-derive the view and publish it if it changed.
    async fn publish_view(&self) {
        let view = if self.joined.is_some() {
            let snapshot = self.registry.snapshot().await;
            project_view(
                &snapshot,
                self.active_speakers.as_deref(),
                self.producers.local_audio_id(),
                self.config.render_slots,
                self.degraded,
            )
        } else {
            ParticipantView {
                degraded: self.degraded,
                ..ParticipantView::not_joined()
            }
        };

        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn local_feed(&self) -> Option<LocalFeed> {
        Some(LocalFeed {
            audio_id: self.producers.audio()?.id().clone(),
            video_id: self.producers.video()?.id().clone(),
        })
    }

    async fn state(&self) -> SessionState {
        SessionState {
            room_id: self.joined.as_ref().map(|j| j.room_id.clone()),
            joined_at: self.joined.as_ref().map(|j| j.joined_at),
            registry_entries: self.registry.len().await,
            pending_batches: self.batches.len(),
            active_speakers: self.active_speakers.clone(),
            capture_enabled: self.local_stream.is_some(),
            local_feed: self.local_feed(),
            send_in_progress: !self.send_tasks.is_empty(),
            muted: self.producers.audio().map(|p| p.is_paused()),
            degraded: self.degraded,
            fatal_error: self.fatal_error.as_ref().map(ToString::to_string),
        }
    }

    async fn graceful_shutdown(&mut self) {
        self.task_token.cancel();
        while let Some(done) = self.send_tasks.join_next().await {
            let Ok(SendCompletion {
                transport,
                result,
                respond_to,
            }) = done
            else {
                continue;
            };
            if let Ok(mut producers) = result {
                producers.close();
            }
            if let Some(transport) = transport {
                transport.close();
            }
            let _ = respond_to.send(Err(SessionError::Cancelled));
        }

        self.batches.shutdown().await;
        self.producers.close_all();
        if let Some(transport) = self.send_transport.take() {
            transport.close();
        }
        self.registry.close_all().await;
        self.joined = None;
        self.view.send_replace(ParticipantView::not_joined());

        debug!(target: "sfu.session", "Session resources released");
    }
}
