use std::path::PathBuf;

/// Errors from session-file reading.
///
/// XML-level problems never surface here: the index builders return partial
/// results instead. Only I/O and decompression-bound failures are errors.
#[derive(Debug, thiserror::Error)]
pub enum AlsError {
    /// Filesystem read failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decompressed session exceeds the safety cap.
    #[error("decompressed session exceeds {limit} bytes: {path}")]
    TooLarge { path: PathBuf, limit: u64 },
}

/// Result alias for session-file operations.
pub type AlsResult<T> = Result<T, AlsError>;
