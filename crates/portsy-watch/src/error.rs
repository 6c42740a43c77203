use std::path::PathBuf;

/// Errors from watcher setup.
///
/// Transient filesystem-event errors after setup are logged, never
/// propagated; a watcher dies only on cancellation.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The project has no top-level `.als` to track.
    #[error("no session file at project root: {0}")]
    NoSessionFile(PathBuf),

    /// The OS watcher could not be created or attached.
    #[error("watch setup failed: {0}")]
    Notify(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for watcher operations.
pub type WatchResult<T> = Result<T, WatchError>;
