use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algo::HashAlgo;
use crate::entry::FileEntry;
use crate::error::TypeError;

/// Directory name reserved for engine-owned files inside a project.
pub const PORTSY_DIR: &str = ".portsy";

/// An immutable snapshot of a project at a point in time.
///
/// Entries are sorted ascending by `path` and paths are unique; once a state
/// has been finalized into a commit it is never mutated. `project_path` is
/// local context only and is never used for equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_path: String,
    /// Digest algorithm shared by every entry's `hash`.
    #[serde(default)]
    pub algo: HashAlgo,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Unix seconds at snapshot time.
    #[serde(default)]
    pub created_at: i64,
}

impl ProjectState {
    /// Build a state from unordered entries, sorting them by path.
    pub fn new(
        project_name: impl Into<String>,
        project_path: impl Into<String>,
        algo: HashAlgo,
        mut files: Vec<FileEntry>,
        created_at: i64,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            project_name: project_name.into(),
            project_path: project_path.into(),
            algo,
            files,
            created_at,
        }
    }

    /// The `{path → hash}` projection used by diffs and the local cache.
    pub fn manifest(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|f| (f.path.clone(), f.hash.clone()))
            .collect()
    }

    /// Look up an entry by its manifest path.
    pub fn entry(&self, path: &str) -> Option<&FileEntry> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.files[i])
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check the structural invariants of a well-formed state:
    /// ascending-sorted unique paths, no `..` segments, nothing under the
    /// engine-owned `.portsy/` directory.
    pub fn validate(&self) -> Result<(), TypeError> {
        let mut prev: Option<&str> = None;
        for f in &self.files {
            if f.path.split('/').any(|seg| seg == "..") {
                return Err(TypeError::PathTraversal(f.path.clone()));
            }
            if f.path == PORTSY_DIR || f.path.starts_with(".portsy/") {
                return Err(TypeError::ReservedPath(f.path.clone()));
            }
            match prev {
                Some(p) if p == f.path => return Err(TypeError::DuplicatePath(f.path.clone())),
                Some(p) if p > f.path.as_str() => {
                    return Err(TypeError::UnsortedPath(f.path.clone()))
                }
                _ => {}
            }
            prev = Some(&f.path);
        }
        Ok(())
    }
}
