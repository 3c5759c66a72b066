//! Counting media engine for SFU client testing.
//!
//! Behaves like a permissive engine and records every call that matters to
//! handshake and teardown assertions:
//! - capability loads (and optional rejection)
//! - DTLS parameter requests and connect completions per transport
//! - closed transports, senders and receivers
//!
//! # Example
//!
//! ```rust,ignore
//! use sfu_test_utils::MockMediaEngine;
//!
//! let engine = MockMediaEngine::new();
//! // ... negotiate audio + video on one receive transport ...
//! assert_eq!(engine.dtls_requests("transport-1"), 1);
//! ```

use async_trait::async_trait;
use common::types::{MediaId, MediaKind};
use serde_json::json;
use sfu_client::engine::{
    EngineReceiver, EngineSender, EngineTransport, MediaEngine, MediaStream, MediaTrack,
};
use sfu_client::errors::EngineError;
use signaling_protocol::{
    ConsumerParameters, DtlsParameters, RouterCapabilities, RtpCapabilities, RtpParameters,
    TransportParameters,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock media engine. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMediaEngine {
    inner: Arc<Mutex<EngineState>>,
}

#[derive(Debug, Default)]
struct EngineState {
    reject_capabilities: bool,
    without_video: bool,
    failed_receives: HashSet<MediaId>,
    loads: usize,
    dtls_requests: HashMap<String, usize>,
    connects: HashMap<String, usize>,
    closed_transports: Vec<String>,
    closed_senders: usize,
    closed_receivers: usize,
    paused: HashMap<MediaKind, bool>,
}

impl MockMediaEngine {
    /// Engine that accepts any capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that rejects the router capabilities.
    #[must_use]
    pub fn rejecting_capabilities() -> Self {
        let engine = Self::new();
        engine.inner.lock().unwrap().reject_capabilities = true;
        engine
    }

    /// Capture yields an audio track only.
    #[must_use]
    pub fn without_video(self) -> Self {
        self.inner.lock().unwrap().without_video = true;
        self
    }

    /// Fail building the local receiver for production `pid`.
    #[must_use]
    pub fn fail_receive_for(self, pid: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failed_receives
            .insert(MediaId::new(pid));
        self
    }

    /// Number of `load` calls.
    pub fn loads(&self) -> usize {
        self.inner.lock().unwrap().loads
    }

    /// DTLS parameter requests on transport `id`.
    pub fn dtls_requests(&self, id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .dtls_requests
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Connect completions on transport `id`.
    pub fn connects(&self, id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .connects
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether transport `id` has been closed.
    pub fn is_closed(&self, id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .closed_transports
            .iter()
            .any(|closed| closed == id)
    }

    /// Number of closed transports.
    pub fn closed_transport_count(&self) -> usize {
        self.inner.lock().unwrap().closed_transports.len()
    }

    /// Number of closed senders.
    pub fn closed_senders(&self) -> usize {
        self.inner.lock().unwrap().closed_senders
    }

    /// Number of closed receivers.
    pub fn closed_receivers(&self) -> usize {
        self.inner.lock().unwrap().closed_receivers
    }

    /// Last pause state applied to the sender of `kind`.
    pub fn sender_paused(&self, kind: MediaKind) -> Option<bool> {
        self.inner.lock().unwrap().paused.get(&kind).copied()
    }

    fn transport(&self, params: &TransportParameters) -> Arc<dyn EngineTransport> {
        Arc::new(MockTransport {
            id: params.id.clone(),
            state: Arc::clone(&self.inner),
        })
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn load(
        &self,
        router_capabilities: &RouterCapabilities,
    ) -> Result<RtpCapabilities, EngineError> {
        let mut state = self.inner.lock().unwrap();
        state.loads += 1;
        if state.reject_capabilities {
            return Err(EngineError::IncompatibleCapabilities(
                "no codec in common".to_string(),
            ));
        }
        Ok(RtpCapabilities(router_capabilities.0.clone()))
    }

    fn create_send_transport(
        &self,
        params: &TransportParameters,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        Ok(self.transport(params))
    }

    fn create_receive_transport(
        &self,
        params: &TransportParameters,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        Ok(self.transport(params))
    }

    async fn capture_local_media(&self) -> Result<MediaStream, EngineError> {
        let without_video = self.inner.lock().unwrap().without_video;
        let mut tracks = vec![MediaTrack::new("mic-0", MediaKind::Audio)];
        if !without_video {
            tracks.push(MediaTrack::new("cam-0", MediaKind::Video));
        }
        Ok(MediaStream::new("local", tracks))
    }
}

struct MockTransport {
    id: String,
    state: Arc<Mutex<EngineState>>,
}

#[async_trait]
impl EngineTransport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn local_dtls_parameters(&self) -> Result<DtlsParameters, EngineError> {
        *self
            .state
            .lock()
            .unwrap()
            .dtls_requests
            .entry(self.id.clone())
            .or_default() += 1;
        Ok(DtlsParameters(json!({"role": "client", "fingerprints": []})))
    }

    async fn complete_connect(&self) -> Result<(), EngineError> {
        *self
            .state
            .lock()
            .unwrap()
            .connects
            .entry(self.id.clone())
            .or_default() += 1;
        Ok(())
    }

    async fn send(&self, track: &MediaTrack) -> Result<Box<dyn EngineSender>, EngineError> {
        Ok(Box::new(MockSender {
            kind: track.kind,
            state: Arc::clone(&self.state),
        }))
    }

    async fn receive(
        &self,
        params: &ConsumerParameters,
    ) -> Result<Box<dyn EngineReceiver>, EngineError> {
        if self
            .state
            .lock()
            .unwrap()
            .failed_receives
            .contains(&params.producer_id)
        {
            return Err(EngineError::Transport(format!(
                "cannot receive {}",
                params.producer_id
            )));
        }
        Ok(Box::new(MockReceiver {
            track: MediaTrack::new(format!("remote-{}", params.producer_id), params.kind),
            state: Arc::clone(&self.state),
        }))
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.closed_transports.contains(&self.id) {
            state.closed_transports.push(self.id.clone());
        }
    }
}

struct MockSender {
    kind: MediaKind,
    state: Arc<Mutex<EngineState>>,
}

impl EngineSender for MockSender {
    fn rtp_parameters(&self) -> RtpParameters {
        RtpParameters(json!({"kind": self.kind.as_str(), "codecs": []}))
    }

    fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused.insert(self.kind, paused);
    }

    fn close(&self) {
        self.state.lock().unwrap().closed_senders += 1;
    }
}

struct MockReceiver {
    track: MediaTrack,
    state: Arc<Mutex<EngineState>>,
}

impl EngineReceiver for MockReceiver {
    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn close(&self) {
        self.state.lock().unwrap().closed_receivers += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_handshake_calls_per_transport() {
        let engine = MockMediaEngine::new();
        let params = TransportParameters {
            id: "t-1".to_string(),
            ice_parameters: json!({}),
            ice_candidates: vec![],
            dtls_parameters: DtlsParameters::default(),
        };
        let transport = engine.create_receive_transport(&params).unwrap();

        transport.local_dtls_parameters().await.unwrap();
        transport.complete_connect().await.unwrap();
        transport.close();
        transport.close();

        assert_eq!(engine.dtls_requests("t-1"), 1);
        assert_eq!(engine.connects("t-1"), 1);
        assert_eq!(engine.dtls_requests("t-2"), 0);
        assert!(engine.is_closed("t-1"));
        assert_eq!(engine.closed_transport_count(), 1);
    }

    #[tokio::test]
    async fn test_rejecting_capabilities() {
        let engine = MockMediaEngine::rejecting_capabilities();
        let result = engine.load(&RouterCapabilities::default()).await;

        assert!(matches!(
            result,
            Err(EngineError::IncompatibleCapabilities(_))
        ));
        assert_eq!(engine.loads(), 1);
    }
}
