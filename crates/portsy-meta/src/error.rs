/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// No state exists for the project (or the requested commit).
    #[error("no state for project {project}")]
    NoSuchState {
        project: String,
        /// The commit that was asked for, when the lookup was by commit.
        commit: Option<String>,
    },

    /// A finalize-time verification found a missing blob.
    #[error("blob missing for hash {0}")]
    BlobMissing(String),

    /// A stored document cannot be decoded.
    #[error("corrupt metadata document: {0}")]
    CorruptDoc(String),

    /// Reserved: the engine is last-writer-wins on HEAD and never raises
    /// this today.
    #[error("conflicting concurrent update")]
    Conflict,

    /// Transient transport failure; the caller may retry.
    #[error("network error: {0}")]
    Network(String),

    /// Durable-backend filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;
