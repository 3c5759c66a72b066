//! Session orchestration actor.
//!
//! ```text
//! SessionActor (one per client session)
//! ├── owns the producer side (send transport, audio + video producers)
//! ├── holds the shared ConsumerRegistry
//! │   └── written by background consume-batch tasks
//! ├── publishes the ParticipantView on a watch channel
//! └── forwards registry changes to subscribers
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer for session state**: only the actor mutates producers,
//!   speakers and the joined state; the view layer talks to it through
//!   [`SessionHandle`]
//! - **Round trips off the mailbox**: consume batches and `send_feed` run in
//!   `JoinSet`s, so a slow participant or a hung produce never delays
//!   messages, push events or cancellation
//! - **CancellationToken propagation**: background tasks get child tokens and
//!   stop with the session
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and its handle
//! - [`messages`] - Message types for actor communication

pub mod messages;
pub mod session;

pub use messages::*;
pub use session::{SessionActor, SessionHandle};
