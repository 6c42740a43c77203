//! The Portsy synchronization engine.
//!
//! Push: scan → classify against the previous remote state → upload or
//! migrate blobs through a bounded worker pool → two-phase commit → rewrite
//! the local cache. Pull: resolve a target state → verify-or-download each
//! file → optionally prune strays → rewrite the local cache. Both accept a
//! cancellation token and guarantee HEAD is only ever advanced by a
//! successful finalize.

pub mod engine;
pub mod error;
pub mod events;
pub mod overview;
pub mod pull;
pub mod push;

pub use engine::{SyncEngine, SyncEngineOptions};
pub use error::{SyncError, SyncResult};
pub use events::{ChannelBus, Event, EventSink, NullSink};
pub use pull::PullOptions;
pub use push::PushOutcome;
