//! Dark Tower SFU Client Library
//!
//! Client-side negotiation core for a selective forwarding unit session:
//!
//! - Joining a room over a request/response signaling channel
//! - Loading router capabilities into a media engine
//! - Producing local audio and video on a single send transport
//! - Consuming every remote participant on its own receive transport
//! - Keeping a registry of remote participants keyed by audio id
//! - Projecting the registry and active-speaker list onto render slots
//!
//! # Architecture
//!
//! ```text
//! SessionActor
//! ├── SignalingClient ── SignalingChannel (stream codec or test double)
//! ├── MediaEngine (headless engine or test double)
//! ├── ProducerRegistry ── send Transport
//! └── ConsumerRegistry <── ConsumerNegotiator tasks ── receive Transports
//! ```
//!
//! # Key Design Decisions
//!
//! - **Per-participant isolation**: a failure negotiating one participant
//!   never removes or blocks another
//! - **Whole-entry publication**: registry entries are inserted complete,
//!   never filled in piecemeal
//! - **Connect once**: each transport runs its connect handshake at most once,
//!   shared by every concurrent produce or consume
//! - **Pure projection**: the participant view is re-derived from a registry
//!   snapshot on every change
//!
//! # Modules
//!
//! - [`actors`] - Session orchestrator actor and handle
//! - [`config`] - Session configuration from environment
//! - [`engine`] - Media engine seam and headless implementation
//! - [`errors`] - Error types
//! - [`media`] - Transports, producers, consumers and the consumer registry
//! - [`observability`] - Metrics
//! - [`projection`] - Participant view projection
//! - [`signaling`] - Signaling channel seam, typed client and stream transport

pub mod actors;
pub mod config;
pub mod engine;
pub mod errors;
pub mod media;
pub mod observability;
pub mod projection;
pub mod signaling;
