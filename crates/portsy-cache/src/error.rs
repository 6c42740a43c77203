/// Errors from local cache persistence.
///
/// Loads never fail on corrupt content (the cache falls back to empty and
/// archives the bad bytes); only real I/O failures surface.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache could not be serialized (programmer-shape bug; should not
    /// happen for well-formed caches).
    #[error("serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
