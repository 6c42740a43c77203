/// Errors from blob store operations.
///
/// A missing object is an error only where the contract says so: `exists`
/// maps not-found to `false`, downloads map it to `NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key has no object.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Local filesystem failure (reading an upload source, writing a
    /// download target).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transient transport failure; the caller may retry.
    #[error("network error: {0}")]
    Network(String),

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// This backend cannot provide the requested optional capability.
    #[error("{0} not supported by this backend")]
    Unsupported(&'static str),
}

/// Result alias for blob store operations.
pub type StoreResult<T> = Result<T, StoreError>;
