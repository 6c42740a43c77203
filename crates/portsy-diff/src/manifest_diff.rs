use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of one path between two manifests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// One changed path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

/// The result of comparing a current manifest against a cached one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDiff {
    /// Changes sorted ascending by path.
    pub changes: Vec<FileChange>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    pub fn added(&self) -> usize {
        self.count(ChangeKind::Added)
    }

    pub fn modified(&self) -> usize {
        self.count(ChangeKind::Modified)
    }

    pub fn deleted(&self) -> usize {
        self.count(ChangeKind::Deleted)
    }

    /// Paths with the given classification, in path order.
    pub fn paths(&self, kind: ChangeKind) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.path.clone())
            .collect()
    }
}

/// Compute the diff of `current` against `cached`.
///
/// - Paths only in `current` are `Added`.
/// - Paths in both with differing hashes are `Modified`.
/// - Paths only in `cached` are `Deleted`.
///
/// The three sets are disjoint and cover every key of both maps. The result
/// is sorted ascending by path; diffing a manifest against itself is empty.
pub fn diff_manifests(
    current: &BTreeMap<String, String>,
    cached: &BTreeMap<String, String>,
) -> ManifestDiff {
    let mut changes = Vec::new();

    for (path, hash) in current {
        match cached.get(path) {
            None => changes.push(FileChange {
                path: path.clone(),
                kind: ChangeKind::Added,
            }),
            Some(old) if old != hash => changes.push(FileChange {
                path: path.clone(),
                kind: ChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }
    for path in cached.keys() {
        if !current.contains_key(path) {
            changes.push(FileChange {
                path: path.clone(),
                kind: ChangeKind::Deleted,
            });
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    ManifestDiff { changes }
}
