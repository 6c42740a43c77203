use std::path::PathBuf;

/// Errors from sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Scan(#[from] portsy_scan::ScanError),

    #[error(transparent)]
    Cache(#[from] portsy_cache::CacheError),

    #[error(transparent)]
    Hash(#[from] portsy_hash::HashError),

    #[error(transparent)]
    Store(#[from] portsy_store::StoreError),

    #[error(transparent)]
    Meta(#[from] portsy_meta::MetaError),

    /// A downloaded file did not hash to the manifest's digest.
    #[error("verify failed for {path}: expected {expected}, got {actual}")]
    VerifyFailed {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// A worker task panicked or was torn down by the runtime.
    #[error("worker failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
