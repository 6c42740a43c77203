use serde::{Deserialize, Serialize};

/// How many recent commit ids a [`ProjectDoc`] retains.
pub const LAST_COMMITS_KEPT: usize = 5;

/// Lifecycle state of a commit record.
///
/// HEAD may only reference `Final` commits; a `Pending` commit exists from
/// `begin_commit` until finalize succeeds (or an external sweeper collects
/// it — the engine never deletes pending commits itself).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    #[default]
    Pending,
    Final,
}

/// Commit metadata stored alongside each state snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMeta {
    /// Opaque unique identifier; callers control identity (UUIDs in practice).
    pub id: String,
    pub message: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub status: CommitStatus,
}

impl CommitMeta {
    pub fn new(id: impl Into<String>, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            timestamp,
            user_id: None,
            parent_id: None,
            status: CommitStatus::Pending,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }
}

/// The per-project HEAD pointer document.
///
/// `last5` is a bounded FIFO of the most recent commit ids, oldest→newest;
/// appending the sixth id drops the first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_id: Option<String>,
    #[serde(default)]
    pub last_commit_at: i64,
    #[serde(default, rename = "last5")]
    pub last5: Vec<String>,
}

impl ProjectDoc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Advance HEAD to `commit_id` and roll the recent-commit ring.
    ///
    /// Re-advancing to the id already at the head of the ring is a no-op for
    /// `last5`, which keeps a crash-retried finalize from recording the same
    /// commit twice.
    pub fn push_commit(&mut self, commit_id: &str, at: i64) {
        self.last_commit_id = Some(commit_id.to_string());
        self.last_commit_at = at;
        if self.last5.last().map(String::as_str) != Some(commit_id) {
            self.last5.push(commit_id.to_string());
            if self.last5.len() > LAST_COMMITS_KEPT {
                let drop = self.last5.len() - LAST_COMMITS_KEPT;
                self.last5.drain(..drop);
            }
        }
    }
}
