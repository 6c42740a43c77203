//! Filesystem watchers for session-file saves.
//!
//! Two layers: a per-project watcher that turns bursts of filesystem events
//! on one session file into a single debounced, stability-checked
//! [`SaveEvent`], and a fleet watcher that keeps one per-project watcher
//! running for every project folder under a root, discovering new folders
//! as they appear.
//!
//! Live saves are not atomic: the file is written over hundreds of
//! milliseconds and may be locked while the write is in flight. The
//! debounce absorbs the event burst; the stability check (size and mtime
//! unchanged across consecutive polls, plus a successful read-open) decides
//! when the save has actually finished.

pub mod error;
pub mod fleet;
pub mod project;
pub mod stability;

pub use error::{WatchError, WatchResult};
pub use fleet::watch_fleet;
pub use project::{watch_project, SaveCallback, SaveEvent, WatcherConfig};
pub use stability::wait_file_stable;
