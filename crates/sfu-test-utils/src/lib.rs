//! # SFU Test Utilities
//!
//! Shared test utilities for the SFU client.
//!
//! This crate provides mock implementations and test fixtures for
//! isolated session testing without a signaling peer or real media stack.
//!
//! ## Modules
//!
//! - `mock_signaling` - Scriptable signaling peer implementing `SignalingChannel`
//! - `mock_engine` - Counting media engine implementing `MediaEngine`
//! - `fixtures` - Batches, participants and router capabilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sfu_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let signaling = MockSignaling::builder()
//!         .with_existing(TestBatch::new().participant(TestParticipant::new("a1")).build())
//!         .unavailable("v1", UnavailableReason::CannotConsume)
//!         .build();
//!     let engine = MockMediaEngine::new();
//!
//!     // Spawn a session or drive the negotiator directly...
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;
pub mod mock_signaling;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_engine::*;
pub use mock_signaling::*;
