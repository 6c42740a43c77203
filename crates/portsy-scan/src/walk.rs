use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;
use walkdir::WalkDir;

use portsy_types::{normalize_rel, CasePolicy};

use crate::error::{ScanError, ScanResult};

/// Directory names excluded from every scan (first path segment match).
/// `.portsy` is engine-owned; `Build`/`Cache`/`Ableton Project Info` are
/// Ableton render and cache output; the rest are VCS/IDE litter.
const IGNORED_DIRS: &[&str] = &[
    ".portsy",
    "Build",
    "Cache",
    ".git",
    ".idea",
    ".vs",
    ".svn",
    ".hg",
    "Ableton Project Info",
];

/// Junk files excluded by basename.
const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// One file discovered by a walk, before hashing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedFile {
    /// Normalized project-relative path (the future manifest key).
    pub rel: String,
    pub abs: PathBuf,
    pub size: u64,
    /// Unix seconds.
    pub modified: i64,
}

fn ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.iter().any(|d| *d == name)
}

fn ignored_file(name: &str) -> bool {
    IGNORED_FILES.iter().any(|f| *f == name)
}

/// Walk `root` depth-first and return a stable, normalized file list.
///
/// - Skips ignored directories, junk files, and symlinks (both file and
///   directory symlinks, which prevents cycles).
/// - Skips unreadable entries silently; only an unreadable root fails.
/// - Returns entries sorted ascending by `rel`.
pub fn walk_project(root: &Path, policy: CasePolicy) -> ScanResult<Vec<ScannedFile>> {
    // Surface root problems eagerly with a dedicated error; walkdir would
    // otherwise report them as just another entry error.
    std::fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            // Project-level ignores apply to the first path segment only; a
            // "Build" nested under Samples/ is someone's audio folder.
            if e.depth() == 1 && e.file_type().is_dir() {
                let name = e.file_name().to_string_lossy();
                if ignored_dir(&name) {
                    return false;
                }
            }
            // Prunes symlinked directories (cycle prevention) and drops
            // symlinked files in the same stroke.
            !e.path_is_symlink()
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 || !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if ignored_file(&name) {
            continue;
        }

        let rel = match entry.path().strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let rel = normalize_rel(&rel.to_string_lossy(), policy);

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "skipping: stat failed");
                continue;
            }
        };
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        out.push(ScannedFile {
            rel,
            abs: entry.into_path(),
            size: meta.len(),
            modified,
        });
    }

    out.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(out)
}
