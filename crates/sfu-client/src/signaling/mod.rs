//! Signaling channel to the remote peer.
//!
//! [`SignalingChannel`] is the transport seam: one request, one response,
//! plus fire-and-forget notifications. Push events and connection lifecycle
//! changes are delivered separately as [`ChannelEvent`]s on an mpsc receiver
//! handed to the session orchestrator.
//!
//! [`SignalingClient`] wraps a channel with typed per-topic calls and bounded
//! timeouts.

mod client;
mod stream;

pub use client::SignalingClient;
pub use stream::StreamSignalingChannel;

use crate::errors::SignalingError;
use async_trait::async_trait;
use serde_json::Value;
use signaling_protocol::{SignalingEvent, SignalingNotification, SignalingRequest};

/// Capacity of the channel-event queue feeding the orchestrator.
pub const CHANNEL_EVENT_CAPACITY: usize = 256;

/// Request/response transport to the signaling peer.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send `request` and wait for its response payload.
    ///
    /// Implementations do not apply timeouts; [`SignalingClient`] does.
    async fn request(&self, request: SignalingRequest) -> Result<Value, SignalingError>;

    /// Queue a notification without waiting for delivery.
    fn notify(&self, notification: SignalingNotification) -> Result<(), SignalingError>;
}

/// Inbound traffic that is not a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is up.
    Connected,
    /// The channel went down; pending and future requests fail.
    Disconnected { reason: String },
    /// A push event from the peer.
    Push(SignalingEvent),
}
