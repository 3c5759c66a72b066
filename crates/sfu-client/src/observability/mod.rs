//! Observability for the SFU client.
//!
//! # Privacy by Default
//!
//! Negotiation code logs media ids and transport ids only; display names and
//! engine parameter blobs never reach log fields or metric labels. Metric
//! labels are bounded enums:
//! - `kind`: audio, video
//! - `direction`: send, receive
//! - `topic`: the six request topics
//! - `outcome`: bounded per metric (see [`metrics`])
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sfu_client_consume_total` | Counter | `kind`, `outcome` | Consume attempts per kind |
//! | `sfu_client_transport_connect_total` | Counter | `direction`, `outcome` | Connect handshakes |
//! | `sfu_client_produce_total` | Counter | `kind`, `outcome` | Producer registrations |
//! | `sfu_client_signaling_timeouts_total` | Counter | `topic` | Expired signaling requests |
//! | `sfu_client_signaling_latency_seconds` | Histogram | `topic` | Signaling round trip time |
//! | `sfu_client_registry_entries` | Gauge | none | Published consumer entries |
//!
//! The library never installs a recorder; embedding applications do.

pub mod metrics;
