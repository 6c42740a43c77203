//! Logical diffing between two session revisions.
//!
//! The manifest diff says "the `.als` changed". The logical diff says what
//! changed inside it: which samples were added, removed, or re-recorded,
//! and which MIDI clips gained or lost notes.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use portsy_hash::Hasher;

use crate::error::AlsResult;
use crate::index::{build_index, SessionIndex};
use crate::reader::read_session_xml;
use crate::samples::is_windows_abs;

/// Sample-level changes between two sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Referenced by both revisions but with differing content digests.
    pub changed: Vec<String>,
}

/// MIDI-clip changes between two sessions, keyed by clip name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipDiff {
    pub added_clips: Vec<String>,
    pub removed_clips: Vec<String>,
    pub changed_clips: Vec<String>,
}

/// The combined logical diff shipped to the UI layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlsLogicalDiff {
    pub samples: SampleDiff,
    pub midi: ClipDiff,
}

impl AlsLogicalDiff {
    pub fn is_empty(&self) -> bool {
        self.samples.added.is_empty()
            && self.samples.removed.is_empty()
            && self.samples.changed.is_empty()
            && self.midi.added_clips.is_empty()
            && self.midi.removed_clips.is_empty()
            && self.midi.changed_clips.is_empty()
    }
}

/// Diff two already-built indexes.
///
/// `prev_hash` answers "what was this sample's content digest in the last
/// committed manifest" (by project-relative path); shared samples whose
/// current on-disk digest differs are classified as changed. Samples that
/// cannot be hashed locally (outside the project, vanished) are left
/// unclassified, matching the best-effort nature of the enrichment.
pub fn diff_indexes(
    prev: &SessionIndex,
    curr: &SessionIndex,
    project_root: &Path,
    hasher: &Hasher,
    prev_hash: &dyn Fn(&str) -> Option<String>,
) -> AlsLogicalDiff {
    let prev_set: BTreeSet<&String> = prev.sample_paths.iter().collect();
    let curr_set: BTreeSet<&String> = curr.sample_paths.iter().collect();

    let mut diff = AlsLogicalDiff::default();
    for p in curr_set.difference(&prev_set) {
        diff.samples.added.push((*p).clone());
    }
    for p in prev_set.difference(&curr_set) {
        diff.samples.removed.push((*p).clone());
    }
    for p in curr_set.intersection(&prev_set) {
        let Some(prev_digest) = prev_hash(p) else {
            continue;
        };
        let Some(curr_digest) = hash_local_sample(project_root, p, hasher) else {
            continue;
        };
        if !prev_digest.eq_ignore_ascii_case(&curr_digest) {
            diff.samples.changed.push((*p).clone());
        }
    }

    for (name, hash) in &curr.clip_hashes {
        match prev.clip_hashes.get(name) {
            None => diff.midi.added_clips.push(name.clone()),
            Some(old) if old != hash => diff.midi.changed_clips.push(name.clone()),
            Some(_) => {}
        }
    }
    for name in prev.clip_hashes.keys() {
        if !curr.clip_hashes.contains_key(name) {
            diff.midi.removed_clips.push(name.clone());
        }
    }

    diff.samples.added.sort();
    diff.samples.removed.sort();
    diff.samples.changed.sort();
    diff.midi.added_clips.sort();
    diff.midi.removed_clips.sort();
    diff.midi.changed_clips.sort();
    diff
}

/// Compare a previous session revision (decompressed XML, if available)
/// against the session currently on disk.
pub fn compute_logical_diff(
    prev_xml: Option<&[u8]>,
    curr_als_path: &Path,
    project_root: &Path,
    hasher: &Hasher,
    prev_hash: &dyn Fn(&str) -> Option<String>,
) -> AlsResult<AlsLogicalDiff> {
    let curr_xml = read_session_xml(curr_als_path)?;
    let prev_idx = prev_xml
        .map(|xml| build_index(xml, project_root))
        .unwrap_or_default();
    let curr_idx = build_index(&curr_xml, project_root);
    Ok(diff_indexes(&prev_idx, &curr_idx, project_root, hasher, prev_hash))
}

fn hash_local_sample(project_root: &Path, rel_or_abs: &str, hasher: &Hasher) -> Option<String> {
    let path = if Path::new(rel_or_abs).is_absolute() || is_windows_abs(rel_or_abs) {
        Path::new(rel_or_abs).to_path_buf()
    } else {
        project_root.join(rel_or_abs)
    };
    match hasher.hash_file(&path) {
        Ok(hashed) => Some(hashed.hash),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "cannot hash sample for logical diff");
            None
        }
    }
}
