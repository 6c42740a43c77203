use serde::{Deserialize, Serialize};

/// One tracked file in a manifest/state.
///
/// `path` is relative to the project root, forward-slashed, and already
/// normalized per the state's case policy. `modified` is informational only;
/// equality between entries is decided by `hash`, never by mtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    /// Hex content digest under the owning state's algorithm.
    pub hash: String,
    pub size: u64,
    /// Unix seconds at scan time.
    pub modified: i64,
    /// Where the content lives in the blob store; absent until assigned
    /// during push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_key: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, hash: impl Into<String>, size: u64, modified: i64) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            size,
            modified,
            blob_key: None,
        }
    }

    /// Same entry with a blob key attached.
    pub fn with_blob_key(mut self, key: impl Into<String>) -> Self {
        self.blob_key = Some(key.into());
        self
    }
}
