//! Concurrent negotiation of consume batches.
//!
//! Each batch index is negotiated in its own task: receive transport, then
//! audio and video consumes side by side, then a whole-entry upsert. Indices
//! never wait on or fail each other. An index whose audio id is already in
//! flight is skipped; an already registered id is negotiated afresh and the
//! old entry is closed once replaced.

use super::consumer::ConsumerTransportManager;
use super::registry::{ConsumerEntry, ConsumerRegistry};
use crate::errors::SessionError;
use common::types::{MediaId, MediaKind};
use signaling_protocol::{BatchEntry, ConsumeBatch, RtpCapabilities};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Outcome of one batch, for diagnostics.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Audio ids whose entries were published.
    pub published: Vec<MediaId>,
    /// Audio ids that produced no entry, with the most severe cause.
    pub failed: Vec<(MediaId, SessionError)>,
    /// Audio ids skipped because a negotiation was already in flight.
    pub skipped: Vec<MediaId>,
}

impl BatchReport {
    /// Total indices accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.published.len() + self.failed.len() + self.skipped.len()
    }
}

/// Everything a negotiation task needs, captured at spawn time.
#[derive(Clone)]
pub struct ConsumerNegotiator {
    transports: ConsumerTransportManager,
    rtp_capabilities: RtpCapabilities,
    registry: Arc<ConsumerRegistry>,
}

impl ConsumerNegotiator {
    #[must_use]
    pub fn new(
        transports: ConsumerTransportManager,
        rtp_capabilities: RtpCapabilities,
        registry: Arc<ConsumerRegistry>,
    ) -> Self {
        Self {
            transports,
            rtp_capabilities,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConsumerRegistry> {
        &self.registry
    }

    /// Negotiate every index of `batch` concurrently.
    ///
    /// Entries are published as each index completes, not at batch end.
    #[instrument(skip_all, name = "sfu.consumer.batch", fields(size = batch.len()))]
    pub async fn consume_batch(&self, batch: ConsumeBatch) -> BatchReport {
        let mut report = BatchReport::default();
        let mut tasks = JoinSet::new();

        for entry in batch.entries() {
            let Some(claim) = self.registry.try_claim(&entry.audio_id) else {
                info!(
                    target: "sfu.consumer",
                    audio_id = %entry.audio_id,
                    "Negotiation already in flight, skipping"
                );
                report.skipped.push(entry.audio_id);
                continue;
            };

            let negotiator = self.clone();
            tasks.spawn(async move {
                let key = entry.audio_id.clone();
                let result = negotiator.negotiate_participant(entry).await;
                drop(claim);
                (key, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(()))) => report.published.push(key),
                Ok((key, Err(e))) => report.failed.push((key, e)),
                Err(e) => {
                    error!(target: "sfu.consumer", error = %e, "Negotiation task panicked");
                }
            }
        }

        info!(
            target: "sfu.consumer",
            published = report.published.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Batch negotiated"
        );

        report
    }

    /// Negotiate one participant and publish its entry.
    ///
    /// # Errors
    ///
    /// Returns the most severe per-kind error when no consumer succeeded, or
    /// the transport request error.
    #[instrument(
        skip_all,
        name = "sfu.consumer.participant",
        fields(audio_id = %entry.audio_id, index = entry.index)
    )]
    pub async fn negotiate_participant(&self, entry: BatchEntry) -> Result<(), SessionError> {
        let transport = self
            .transports
            .create_consumer_transport(&entry.audio_id)
            .await
            .inspect_err(|e| {
                warn!(target: "sfu.consumer", error = %e, "Receive transport request failed");
            })?;

        let audio = self.transports.consume(
            &transport,
            &self.rtp_capabilities,
            entry.audio_id.clone(),
            MediaKind::Audio,
        );
        let video = async {
            match &entry.video_id {
                Some(video_id) => Some(
                    self.transports
                        .consume(
                            &transport,
                            &self.rtp_capabilities,
                            video_id.clone(),
                            MediaKind::Video,
                        )
                        .await,
                ),
                None => None,
            }
        };
        let (audio, video) = tokio::join!(audio, video);

        let mut errors = Vec::new();
        let audio_consumer = audio.map_err(|e| errors.push(e)).ok();
        let video_consumer = video.and_then(|v| v.map_err(|e| errors.push(e)).ok());

        for e in &errors {
            info!(target: "sfu.consumer", error = %e, "Media kind unavailable");
        }

        let Some(consumer_entry) = ConsumerEntry::new(
            entry.display_name,
            Arc::clone(&transport),
            audio_consumer,
            video_consumer,
        ) else {
            transport.close();
            return Err(errors
                .into_iter()
                .max_by_key(SessionError::severity)
                .unwrap_or_else(|| {
                    SessionError::Internal("participant produced no consumers".to_string())
                }));
        };

        let track_count = consumer_entry.combined_stream().track_count();
        if let Some(previous) = self
            .registry
            .upsert(entry.audio_id.clone(), consumer_entry)
            .await
        {
            previous.close();
        }

        info!(target: "sfu.consumer", tracks = track_count, "Participant published");
        Ok(())
    }
}
