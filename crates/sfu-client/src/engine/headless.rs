//! Headless media engine.
//!
//! Negotiates like a real engine but renders nothing: capture yields
//! synthetic tracks, receivers yield track handles without decoding, and
//! DTLS parameters carry a freshly generated SHA-256 certificate
//! fingerprint. Backs the `sfu-probe` binary.

use super::{EngineReceiver, EngineSender, EngineTransport, MediaEngine, MediaStream, MediaTrack};
use crate::errors::EngineError;
use async_trait::async_trait;
use common::types::{MediaKind, TransportDirection};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{json, Value};
use signaling_protocol::{
    ConsumerParameters, DtlsParameters, RouterCapabilities, RtpCapabilities, RtpParameters,
    TransportParameters,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Codecs the headless engine can negotiate (MIME types, case-insensitive).
pub const SUPPORTED_CODECS: [&str; 2] = ["audio/opus", "video/VP8"];

/// [`MediaEngine`] without capture devices or rendering.
pub struct HeadlessEngine {
    rng: SystemRandom,
    codecs: OnceLock<Arc<Vec<Value>>>,
    track_counter: AtomicU64,
}

impl HeadlessEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
            codecs: OnceLock::new(),
            track_counter: AtomicU64::new(0),
        }
    }

    fn loaded_codecs(&self) -> Result<Arc<Vec<Value>>, EngineError> {
        self.codecs.get().cloned().ok_or(EngineError::NotLoaded)
    }

    fn create_transport(
        &self,
        params: &TransportParameters,
        direction: TransportDirection,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        let codecs = self.loaded_codecs()?;
        let fingerprint = generate_fingerprint(&self.rng)?;

        debug!(
            target: "sfu.engine",
            transport_id = %params.id,
            direction = direction.as_str(),
            "Created headless transport"
        );

        Ok(Arc::new(HeadlessTransport {
            id: params.id.clone(),
            codecs,
            fingerprint,
            rng: self.rng.clone(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for HeadlessEngine {
    async fn load(
        &self,
        router_capabilities: &RouterCapabilities,
    ) -> Result<RtpCapabilities, EngineError> {
        if self.codecs.get().is_some() {
            return Err(EngineError::AlreadyLoaded);
        }

        let codecs: Vec<Value> = router_capabilities
            .0
            .get("codecs")
            .and_then(Value::as_array)
            .map(|codecs| codecs.iter().filter(|c| is_supported(c)).cloned().collect())
            .unwrap_or_default();

        if codecs.is_empty() {
            warn!(target: "sfu.engine", "Router offers no supported codec");
            return Err(EngineError::IncompatibleCapabilities(format!(
                "router offers none of {}",
                SUPPORTED_CODECS.join(", ")
            )));
        }

        let header_extensions = router_capabilities
            .0
            .get("headerExtensions")
            .cloned()
            .unwrap_or_else(|| json!([]));

        let rtp_capabilities = RtpCapabilities(json!({
            "codecs": codecs,
            "headerExtensions": header_extensions,
        }));

        self.codecs
            .set(Arc::new(codecs))
            .map_err(|_| EngineError::AlreadyLoaded)?;

        info!(target: "sfu.engine", "Router capabilities loaded");
        Ok(rtp_capabilities)
    }

    fn create_send_transport(
        &self,
        params: &TransportParameters,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        self.create_transport(params, TransportDirection::Send)
    }

    fn create_receive_transport(
        &self,
        params: &TransportParameters,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        self.create_transport(params, TransportDirection::Receive)
    }

    async fn capture_local_media(&self) -> Result<MediaStream, EngineError> {
        let n = self.track_counter.fetch_add(1, Ordering::Relaxed);
        Ok(MediaStream::combined(vec![
            MediaTrack::new(format!("headless-audio-{n}"), MediaKind::Audio),
            MediaTrack::new(format!("headless-video-{n}"), MediaKind::Video),
        ]))
    }
}

fn is_supported(codec: &Value) -> bool {
    codec
        .get("mimeType")
        .and_then(Value::as_str)
        .is_some_and(|mime| {
            SUPPORTED_CODECS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(mime))
        })
}

fn codec_kind(codec: &Value) -> Option<&str> {
    codec
        .get("kind")
        .and_then(Value::as_str)
        .or_else(|| {
            codec
                .get("mimeType")
                .and_then(Value::as_str)
                .and_then(|mime| mime.split('/').next())
        })
}

/// Colon-separated uppercase hex SHA-256 over fresh random key material.
fn generate_fingerprint(rng: &SystemRandom) -> Result<String, EngineError> {
    let mut material = [0u8; 32];
    rng.fill(&mut material)
        .map_err(|_| EngineError::Transport("failed to generate key material".to_string()))?;

    let hash = digest(&SHA256, &material);
    Ok(hash
        .as_ref()
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(":"))
}

struct HeadlessTransport {
    id: String,
    codecs: Arc<Vec<Value>>,
    fingerprint: String,
    rng: SystemRandom,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl HeadlessTransport {
    fn check_usable(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Transport(format!("transport {} closed", self.id)));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(EngineError::Transport(format!(
                "transport {} not connected",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineTransport for HeadlessTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn local_dtls_parameters(&self) -> Result<DtlsParameters, EngineError> {
        Ok(DtlsParameters(json!({
            "role": "auto",
            "fingerprints": [{"algorithm": "sha-256", "value": self.fingerprint}],
        })))
    }

    async fn complete_connect(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Transport(format!("transport {} closed", self.id)));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, track: &MediaTrack) -> Result<Box<dyn EngineSender>, EngineError> {
        self.check_usable()?;

        let mut ssrc_bytes = [0u8; 4];
        self.rng
            .fill(&mut ssrc_bytes)
            .map_err(|_| EngineError::Transport("failed to generate ssrc".to_string()))?;
        let ssrc = u32::from_be_bytes(ssrc_bytes);

        let codecs: Vec<Value> = self
            .codecs
            .iter()
            .filter(|c| codec_kind(c) == Some(track.kind.as_str()))
            .cloned()
            .collect();
        if codecs.is_empty() {
            return Err(EngineError::Transport(format!(
                "no negotiated {} codec",
                track.kind
            )));
        }

        Ok(Box::new(HeadlessSender {
            rtp_parameters: RtpParameters(json!({
                "mid": track.id,
                "codecs": codecs,
                "encodings": [{"ssrc": ssrc}],
            })),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    async fn receive(
        &self,
        params: &ConsumerParameters,
    ) -> Result<Box<dyn EngineReceiver>, EngineError> {
        self.check_usable()?;
        Ok(Box::new(HeadlessReceiver {
            track: MediaTrack::new(format!("remote-{}", params.id), params.kind),
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(target: "sfu.engine", transport_id = %self.id, "Closed headless transport");
        }
    }
}

struct HeadlessSender {
    rtp_parameters: RtpParameters,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl EngineSender for HeadlessSender {
    fn rtp_parameters(&self) -> RtpParameters {
        self.rtp_parameters.clone()
    }

    fn set_paused(&self, paused: bool) {
        if !self.closed.load(Ordering::SeqCst) {
            self.paused.store(paused, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct HeadlessReceiver {
    track: MediaTrack,
}

impl EngineReceiver for HeadlessReceiver {
    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn close(&self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::MediaId;

    fn router_capabilities() -> RouterCapabilities {
        RouterCapabilities(json!({
            "codecs": [
                {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
                {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000},
                {"kind": "video", "mimeType": "video/H264", "clockRate": 90000}
            ],
            "headerExtensions": []
        }))
    }

    fn transport_params(id: &str) -> TransportParameters {
        TransportParameters {
            id: id.to_string(),
            ice_parameters: Value::Null,
            ice_candidates: Vec::new(),
            dtls_parameters: DtlsParameters::default(),
        }
    }

    #[tokio::test]
    async fn test_load_keeps_supported_codecs_only() {
        let engine = HeadlessEngine::new();
        let caps = engine.load(&router_capabilities()).await.unwrap();

        let codecs = caps.0["codecs"].as_array().unwrap();
        assert_eq!(codecs.len(), 2);
        assert!(codecs.iter().all(is_supported));
    }

    #[tokio::test]
    async fn test_load_rejects_incompatible_router() {
        let engine = HeadlessEngine::new();
        let result = engine
            .load(&RouterCapabilities(json!({
                "codecs": [{"kind": "video", "mimeType": "video/H265"}]
            })))
            .await;

        assert!(matches!(result, Err(EngineError::IncompatibleCapabilities(_))));
    }

    #[tokio::test]
    async fn test_load_is_once_only() {
        let engine = HeadlessEngine::new();
        engine.load(&router_capabilities()).await.unwrap();

        let second = engine.load(&router_capabilities()).await;
        assert!(matches!(second, Err(EngineError::AlreadyLoaded)));
    }

    #[tokio::test]
    async fn test_transport_requires_load() {
        let engine = HeadlessEngine::new();
        let result = engine.create_send_transport(&transport_params("t1"));
        assert!(matches!(result, Err(EngineError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_dtls_fingerprint_format() {
        let engine = HeadlessEngine::new();
        engine.load(&router_capabilities()).await.unwrap();
        let transport = engine.create_send_transport(&transport_params("t1")).unwrap();

        let dtls = transport.local_dtls_parameters().await.unwrap();
        let fingerprint = dtls.0["fingerprints"][0]["value"].as_str().unwrap();

        let octets: Vec<&str> = fingerprint.split(':').collect();
        assert_eq!(octets.len(), 32);
        assert!(octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit())));
        assert_eq!(fingerprint, fingerprint.to_uppercase());
    }

    #[tokio::test]
    async fn test_send_requires_connect() {
        let engine = HeadlessEngine::new();
        engine.load(&router_capabilities()).await.unwrap();
        let transport = engine.create_send_transport(&transport_params("t1")).unwrap();
        let track = MediaTrack::new("mic", MediaKind::Audio);

        assert!(transport.send(&track).await.is_err());

        transport.complete_connect().await.unwrap();
        let sender = transport.send(&track).await.unwrap();
        let params = sender.rtp_parameters();
        assert_eq!(params.0["codecs"][0]["mimeType"], "audio/opus");
        assert_eq!(params.0["mid"], "mic");
    }

    #[tokio::test]
    async fn test_receive_yields_track_of_kind() {
        let engine = HeadlessEngine::new();
        engine.load(&router_capabilities()).await.unwrap();
        let transport = engine
            .create_receive_transport(&transport_params("t2"))
            .unwrap();
        transport.complete_connect().await.unwrap();

        let receiver = transport
            .receive(&ConsumerParameters {
                id: "c1".to_string(),
                producer_id: MediaId::new("v1"),
                kind: MediaKind::Video,
                rtp_parameters: RtpParameters::default(),
            })
            .await
            .unwrap();
        assert_eq!(receiver.track().kind, MediaKind::Video);

        transport.close();
        assert!(transport.complete_connect().await.is_err());
    }

    #[tokio::test]
    async fn test_capture_yields_audio_and_video() {
        let engine = HeadlessEngine::new();
        let stream = engine.capture_local_media().await.unwrap();
        assert!(stream.has_kind(MediaKind::Audio));
        assert!(stream.has_kind(MediaKind::Video));
    }
}
