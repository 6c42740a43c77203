/// Errors from change tracking.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error(transparent)]
    Scan(#[from] portsy_scan::ScanError),

    #[error(transparent)]
    Cache(#[from] portsy_cache::CacheError),
}

/// Result alias for diff operations.
pub type DiffResult<T> = Result<T, DiffError>;
