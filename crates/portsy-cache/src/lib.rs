//! The per-project local cache: the last manifest known to match the remote.
//!
//! Lives at `<project>/.portsy/cache.json`. Loads fail open — a missing file
//! yields an empty cache, corrupt JSON is archived to a sibling
//! `cache.bad-<timestamp>.json` and replaced by an empty cache. Saves are
//! atomic: write to a temp file, fsync, rename over the target, fsync the
//! parent directory, so no reader ever observes a truncated cache.

pub mod error;

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use portsy_types::{normalize_rel, CasePolicy, HashAlgo, ProjectState};

pub use error::{CacheError, CacheResult};

/// Current schema version written by [`LocalCache::save`].
pub const CACHE_VERSION: u32 = 1;

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// The on-disk cache document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCache {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub algo: HashAlgo,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
    /// `path → hex hash` under `algo`, keys normalized per scanner policy.
    #[serde(default)]
    pub manifest: BTreeMap<String, String>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            algo: HashAlgo::default(),
            updated_at: epoch(),
            manifest: BTreeMap::new(),
        }
    }
}

fn cache_file(project_path: &Path) -> PathBuf {
    project_path.join(".portsy").join("cache.json")
}

fn cache_tmp_file(project_path: &Path) -> PathBuf {
    project_path.join(".portsy").join("cache.json.tmp")
}

impl LocalCache {
    /// Build a cache document from a snapshot. `updated_at` is stamped at
    /// save time.
    pub fn from_state(state: &ProjectState) -> Self {
        Self {
            version: CACHE_VERSION,
            algo: state.algo,
            updated_at: epoch(),
            manifest: state.manifest(),
        }
    }

    /// Load the cache for a project, failing open.
    ///
    /// - Missing file → empty cache with defaults.
    /// - Corrupt JSON → the bytes are preserved to `cache.bad-<ts>.json`
    ///   (best effort) and an empty cache is returned.
    /// - Any other I/O failure (permissions, transient FS trouble) surfaces.
    pub fn load(project_path: &Path, policy: CasePolicy) -> CacheResult<Self> {
        let path = cache_file(project_path);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut cache: Self = match serde_json::from_slice(&bytes) {
            Ok(c) => c,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt cache; archiving and starting empty");
                preserve_corrupt_cache(&path, &bytes);
                return Ok(Self::default());
            }
        };

        // Older files may omit version entirely.
        if cache.version == 0 {
            cache.version = CACHE_VERSION;
        }
        // Re-normalize keys on load so a cache written under a different
        // policy still lines up with the scanner's keys.
        let manifest = std::mem::take(&mut cache.manifest);
        cache.manifest = manifest
            .into_iter()
            .map(|(k, v)| (normalize_rel(&k, policy), v))
            .collect();

        Ok(cache)
    }

    /// Atomically persist the cache, stamping `updated_at` with the current
    /// UTC time.
    pub fn save(&mut self, project_path: &Path) -> CacheResult<()> {
        let path = cache_file(project_path);
        let tmp = cache_tmp_file(project_path);
        fs::create_dir_all(path.parent().expect("cache path has parent"))?;

        self.version = CACHE_VERSION;
        self.updated_at = Utc::now();

        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');

        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        drop(f);

        fs::rename(&tmp, &path)?;

        // Persist the rename itself; best effort, some filesystems refuse
        // directory fsync.
        if let Ok(dir) = File::open(path.parent().expect("cache path has parent")) {
            let _ = dir.sync_all();
        }
        debug!(path = %path.display(), entries = self.manifest.len(), "cache saved");
        Ok(())
    }
}

/// Write the given state as the project's latest cache.
pub fn write_cache_from_state(project_path: &Path, state: &ProjectState) -> CacheResult<()> {
    LocalCache::from_state(state).save(project_path)
}

fn preserve_corrupt_cache(path: &Path, bytes: &[u8]) {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace([':', '-'], "");
    let bad = path.with_file_name(format!("cache.bad-{stamp}.json"));
    if let Err(err) = fs::write(&bad, bytes) {
        warn!(path = %bad.display(), error = %err, "could not archive corrupt cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portsy_types::FileEntry;

    fn sample_state() -> ProjectState {
        ProjectState::new(
            "proj",
            "/tmp/proj",
            HashAlgo::Sha256,
            vec![
                FileEntry::new("track.als", "h1", 1, 0),
                FileEntry::new("Samples/kick.wav", "h2", 2, 0),
            ],
            100,
        )
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::load(dir.path(), CasePolicy::Preserve).unwrap();
        assert_eq!(cache.version, CACHE_VERSION);
        assert_eq!(cache.algo, HashAlgo::Sha256);
        assert!(cache.manifest.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalCache::from_state(&sample_state());
        cache.save(dir.path()).unwrap();

        let loaded = LocalCache::load(dir.path(), CasePolicy::Preserve).unwrap();
        assert_eq!(loaded.manifest, cache.manifest);
        assert_eq!(loaded.algo, HashAlgo::Sha256);
        assert!(loaded.updated_at > epoch());
    }

    #[test]
    fn save_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        write_cache_from_state(dir.path(), &sample_state()).unwrap();
        assert!(cache_file(dir.path()).exists());
        assert!(!cache_tmp_file(dir.path()).exists());
    }

    #[test]
    fn file_format_is_pretty_json_with_expected_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_cache_from_state(dir.path(), &sample_state()).unwrap();
        let text = fs::read_to_string(cache_file(dir.path())).unwrap();
        assert!(text.contains("\n  \"version\": 1"));
        assert!(text.contains("\"algo\": \"sha256\""));
        assert!(text.contains("\"updatedAt\""));
        assert!(text.contains("\"Samples/kick.wav\": \"h2\""));
    }

    #[test]
    fn corrupt_cache_is_archived_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let portsy = dir.path().join(".portsy");
        fs::create_dir_all(&portsy).unwrap();
        fs::write(portsy.join("cache.json"), b"{not json!").unwrap();

        let cache = LocalCache::load(dir.path(), CasePolicy::Preserve).unwrap();
        assert!(cache.manifest.is_empty());

        let archived: Vec<_> = fs::read_dir(&portsy)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("cache.bad-"))
            .collect();
        assert_eq!(archived.len(), 1);
    }

    #[test]
    fn load_normalizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let portsy = dir.path().join(".portsy");
        fs::create_dir_all(&portsy).unwrap();
        fs::write(
            portsy.join("cache.json"),
            br#"{"version":1,"algo":"sha256","manifest":{"Samples\\Kick.wav":"h"}}"#,
        )
        .unwrap();

        let cache = LocalCache::load(dir.path(), CasePolicy::Fold).unwrap();
        assert_eq!(cache.manifest.get("samples/kick.wav").map(String::as_str), Some("h"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let portsy = dir.path().join(".portsy");
        fs::create_dir_all(&portsy).unwrap();
        fs::write(portsy.join("cache.json"), br#"{"manifest":{"a":"1"}}"#).unwrap();

        let cache = LocalCache::load(dir.path(), CasePolicy::Preserve).unwrap();
        assert_eq!(cache.version, CACHE_VERSION);
        assert_eq!(cache.algo, HashAlgo::Sha256);
        assert_eq!(cache.manifest.len(), 1);
    }

    #[test]
    fn save_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        write_cache_from_state(dir.path(), &sample_state()).unwrap();

        let mut smaller = LocalCache::default();
        smaller.manifest.insert("only.wav".into(), "h9".into());
        smaller.save(dir.path()).unwrap();

        let loaded = LocalCache::load(dir.path(), CasePolicy::Preserve).unwrap();
        assert_eq!(loaded.manifest.len(), 1);
        assert!(loaded.manifest.contains_key("only.wav"));
    }
}
