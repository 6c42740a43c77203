use serde::{Deserialize, Serialize};

/// A discovered Ableton project: an immediate child directory of the watched
/// root that holds at least one top-level `.als` session file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbletonProject {
    pub name: String,
    /// Absolute path to the project directory, forward-slashed.
    pub path: String,
    /// Absolute path to the resolved session file.
    pub als_file: String,
    /// Whether `<project>/.portsy/` already exists.
    pub has_portsy: bool,
}

/// Counters returned by a pull.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullStats {
    pub to_download: usize,
    pub downloaded: usize,
    pub verified: usize,
    /// Existed locally with a matching hash.
    pub skipped: usize,
    pub deleted: usize,
}

/// Per-project change summary produced by the change tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectChange {
    pub name: String,
    pub path: String,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub total: usize,
}

/// One row of the project overview: local and remote standing combined.
///
/// `created_locally` means the project exists on disk but has never been
/// pushed; the inverse (remote-only) shows up with an empty `path`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    /// Local project path; empty when the project only exists remotely.
    #[serde(default)]
    pub path: String,
    pub has_local_changes: bool,
    pub created_locally: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_id: Option<String>,
    /// Counts from the local diff; all zero when nothing changed.
    #[serde(default)]
    pub added: usize,
    #[serde(default)]
    pub modified: usize,
    #[serde(default)]
    pub deleted: usize,
}
