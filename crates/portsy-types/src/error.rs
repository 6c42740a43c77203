/// Errors from type-level validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// A manifest path appears more than once in a state.
    #[error("duplicate path in state: {0}")]
    DuplicatePath(String),

    /// State entries are not in ascending path order.
    #[error("state entries not sorted: {0} out of order")]
    UnsortedPath(String),

    /// A manifest path contains a `..` segment.
    #[error("path escapes project root: {0}")]
    PathTraversal(String),

    /// A manifest path points into an engine-owned directory.
    #[error("reserved path in state: {0}")]
    ReservedPath(String),

    /// An unrecognized digest algorithm name.
    #[error("unknown hash algorithm: {0:?}")]
    UnknownAlgo(String),
}
