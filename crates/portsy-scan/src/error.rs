use std::path::PathBuf;

/// Errors from scanning operations.
///
/// Per-file problems (unreadable entries, vanished files) are skipped during
/// a walk; only a failure on the root itself aborts the scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The scan root could not be read.
    #[error("cannot read scan root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem failure outside the walk itself.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for scanning operations.
pub type ScanResult<T> = Result<T, ScanError>;
