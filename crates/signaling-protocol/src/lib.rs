//! Signaling protocol between the Dark Tower SFU client and its signaling peer.
//!
//! Request/response topics mirror the peer's acknowledged-emit API: every
//! request carries a correlation id and is answered by exactly one response
//! with a free-form JSON payload. Push events and fire-and-forget
//! notifications travel in the same frame stream.
//!
//! - [`messages`] - typed request, notification and event schema
//! - [`frame`] - the wire envelope
//! - [`codec`] - length-prefixed JSON framing

#![warn(clippy::pedantic)]

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{decode_envelope, encode_envelope, CodecError, SignalingCodec};
pub use frame::Envelope;
pub use messages::*;
