use std::path::PathBuf;

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Target is a directory or a symlink; manifests track regular files only.
    #[error("cannot hash {0}: not a regular file")]
    InvalidTarget(PathBuf),

    /// Filesystem read/stat failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for hashing operations.
pub type HashResult<T> = Result<T, HashError>;
