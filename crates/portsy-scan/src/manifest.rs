use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use portsy_hash::Hasher;
use portsy_types::{CasePolicy, FileEntry, HashAlgo, ProjectState};

use crate::error::ScanResult;
use crate::walk::walk_project;

/// Walk and hash a project tree into a [`ProjectState`].
///
/// Files whose hash fails mid-scan (deleted between walk and read, locked by
/// another process) are skipped; the snapshot describes what could actually
/// be read.
pub fn build_manifest(
    root: &Path,
    project_name: &str,
    algo: HashAlgo,
    policy: CasePolicy,
) -> ScanResult<ProjectState> {
    let hasher = Hasher::new(algo);
    let scanned = walk_project(root, policy)?;

    let mut files = Vec::with_capacity(scanned.len());
    for f in scanned {
        match hasher.hash_file(&f.abs) {
            Ok(hashed) => files.push(FileEntry::new(f.rel, hashed.hash, hashed.size, hashed.modified)),
            Err(err) => {
                debug!(path = %f.abs.display(), error = %err, "skipping: hash failed");
            }
        }
    }

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(ProjectState::new(
        project_name,
        root.to_string_lossy().replace('\\', "/"),
        algo,
        files,
        created_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn manifest_is_sorted_and_hashed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.als"), b"session").unwrap();
        fs::create_dir(dir.path().join("Samples")).unwrap();
        fs::write(dir.path().join("Samples/a.wav"), b"audio").unwrap();

        let state = build_manifest(dir.path(), "proj", HashAlgo::Sha256, CasePolicy::Preserve)
            .unwrap();
        assert_eq!(state.project_name, "proj");
        assert_eq!(state.algo, HashAlgo::Sha256);
        assert_eq!(state.len(), 2);
        assert_eq!(state.files[0].path, "Samples/a.wav");
        assert_eq!(state.files[1].path, "b.als");
        assert!(state.validate().is_ok());

        let expected = Hasher::new(HashAlgo::Sha256).hash_bytes(b"audio");
        assert_eq!(state.files[0].hash, expected);
        assert_eq!(state.files[0].size, 5);
    }

    #[test]
    fn empty_project_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = build_manifest(dir.path(), "p", HashAlgo::Blake3, CasePolicy::Preserve)
            .unwrap();
        assert!(state.is_empty());
        assert!(state.created_at > 0);
    }

    #[test]
    fn portsy_dir_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".portsy")).unwrap();
        fs::write(dir.path().join(".portsy/cache.json"), b"{}").unwrap();
        fs::write(dir.path().join("track.als"), b"x").unwrap();

        let state = build_manifest(dir.path(), "p", HashAlgo::Sha256, CasePolicy::Preserve)
            .unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.validate().is_ok());
    }
}
