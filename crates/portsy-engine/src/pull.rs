//! Pull: materialize a committed state into a local directory.
//!
//! Every file is verified-or-downloaded; downloads are verified again after
//! landing. Pruning (when allowed) runs only after all downloads complete
//! and never touches `.portsy/`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

use portsy_cache::write_cache_from_state;
use portsy_hash::Hasher;
use portsy_meta::MetaStore;
use portsy_store::BlobStore;
use portsy_types::{normalize_rel, FileEntry, ProjectState, PullStats};

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::events::Event;

/// Pull parameters.
#[derive(Clone, Debug, Default)]
pub struct PullOptions {
    /// Pull this commit instead of HEAD.
    pub commit_id: Option<String>,
    /// Remove local regular files that are not part of the target state.
    /// `.portsy/` is always left alone.
    pub allow_delete: bool,
}

impl SyncEngine {
    /// Pull `project_name` into `dest`.
    pub async fn pull(
        &self,
        project_name: &str,
        dest: &Path,
        options: PullOptions,
        cancel: &CancellationToken,
    ) -> SyncResult<PullStats> {
        let target = match &options.commit_id {
            Some(commit_id) => {
                let (state, _) = self
                    .meta
                    .get_state_by_commit(project_name, commit_id)
                    .await?;
                state
            }
            None => {
                let Some((state, _)) = self.meta.get_latest_state(project_name).await? else {
                    return Err(portsy_meta::MetaError::NoSuchState {
                        project: project_name.to_string(),
                        commit: None,
                    }
                    .into());
                };
                state
            }
        };

        std::fs::create_dir_all(dest)?;
        let stats = Arc::new(Mutex::new(PullStats::default()));

        self.ensure_files(project_name, &target, dest, &stats, cancel)
            .await?;

        if cancel.is_cancelled() {
            // Destination is consistent but incomplete; no cache rewrite.
            return Err(SyncError::Cancelled);
        }

        if options.allow_delete {
            let removed = prune_strays(dest, &target, self.options.case_policy)?;
            stats.lock().expect("lock poisoned").deleted = removed;
        }

        // Record the pulled state as the local last-known-good.
        let root = dest.to_path_buf();
        let state_for_cache = target.clone();
        tokio::task::spawn_blocking(move || write_cache_from_state(&root, &state_for_cache))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))??;

        let stats = *stats.lock().expect("lock poisoned");
        info!(
            project = project_name,
            to_download = stats.to_download,
            downloaded = stats.downloaded,
            verified = stats.verified,
            skipped = stats.skipped,
            deleted = stats.deleted,
            "pull complete"
        );
        self.emit(Event::Log(format!(
            "pull {project_name}: downloaded {} of {}, skipped {}, deleted {}",
            stats.downloaded, stats.to_download, stats.skipped, stats.deleted
        )));
        Ok(stats)
    }

    /// Rollback = pull of a specific commit, in place, with pruning.
    pub async fn rollback(
        &self,
        project_name: &str,
        commit_id: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> SyncResult<PullStats> {
        self.pull(
            project_name,
            dest,
            PullOptions {
                commit_id: Some(commit_id.to_string()),
                allow_delete: true,
            },
            cancel,
        )
        .await
    }

    /// Verify-or-download every file of `target` under the bounded pool.
    async fn ensure_files(
        &self,
        project_name: &str,
        target: &ProjectState,
        dest: &Path,
        stats: &Arc<Mutex<PullStats>>,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let pool_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut set: JoinSet<SyncResult<()>> = JoinSet::new();

        for file in &target.files {
            let blobs = Arc::clone(&self.blobs);
            let semaphore = Arc::clone(&semaphore);
            let token = pool_cancel.clone();
            let stats = Arc::clone(stats);
            let hasher = self.hasher();
            let local_path = dest.join(&file.path);
            let file = file.clone();
            let key = file
                .blob_key
                .clone()
                .unwrap_or_else(|| blobs.build_key(project_name, &file.hash));

            set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| SyncError::Worker(e.to_string()))?;
                if token.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                ensure_one_file(&*blobs, &hasher, &file, &key, &local_path, &stats).await
            });
        }

        let mut first_error: Option<SyncError> = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| SyncError::Worker(e.to_string()))?;
            if let Err(err) = result {
                if first_error.is_none() {
                    pool_cancel.cancel();
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(SyncError::Cancelled) if cancel.is_cancelled() => Err(SyncError::Cancelled),
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Verify one local file against its manifest entry, downloading when
/// missing or mismatched, and verify again after the download.
async fn ensure_one_file(
    blobs: &dyn BlobStore,
    hasher: &Hasher,
    file: &FileEntry,
    key: &str,
    local_path: &Path,
    stats: &Mutex<PullStats>,
) -> SyncResult<()> {
    if let Some(parent) = local_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if local_file_matches(hasher, local_path, &file.hash) {
        stats.lock().expect("lock poisoned").skipped += 1;
        return Ok(());
    }
    stats.lock().expect("lock poisoned").to_download += 1;

    debug!(key, path = %local_path.display(), "downloading");
    blobs.download_to(key, local_path).await?;
    stats.lock().expect("lock poisoned").downloaded += 1;

    let hashed = hasher.hash_file(local_path)?;
    if !hashed.hash.eq_ignore_ascii_case(&file.hash) {
        return Err(SyncError::VerifyFailed {
            path: local_path.to_path_buf(),
            expected: file.hash.clone(),
            actual: hashed.hash,
        });
    }
    stats.lock().expect("lock poisoned").verified += 1;

    restore_mtime(local_path, file.modified);
    Ok(())
}

fn local_file_matches(hasher: &Hasher, path: &Path, expected: &str) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return false,
    }
    match hasher.hash_file(path) {
        Ok(hashed) => hashed.hash.eq_ignore_ascii_case(expected),
        Err(_) => false,
    }
}

/// Best-effort mtime restore; filesystems with coarse timestamp resolution
/// are fine, we only care about approximate ordering in the UI.
fn restore_mtime(path: &Path, modified: i64) {
    if modified <= 0 {
        return;
    }
    let mtime = UNIX_EPOCH + Duration::from_secs(modified as u64);
    if let Ok(file) = std::fs::File::options().write(true).open(path) {
        let _ = file.set_modified(mtime);
    }
}

/// Remove regular files under `dest` that are not in the target state.
/// `.portsy/` is never entered. Returns the number of files removed.
fn prune_strays(
    dest: &Path,
    target: &ProjectState,
    policy: portsy_types::CasePolicy,
) -> SyncResult<usize> {
    let manifest = target.manifest();
    let mut removed = 0usize;

    let walker = WalkDir::new(dest)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1
                && e.file_type().is_dir()
                && e.file_name().to_string_lossy() == ".portsy")
        });
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dest) else {
            continue;
        };
        let rel = normalize_rel(&rel.to_string_lossy(), policy);
        if manifest.contains_key(&rel) {
            continue;
        }
        if std::fs::remove_file(entry.path()).is_ok() {
            debug!(path = %entry.path().display(), "pruned stray file");
            removed += 1;
        }
    }
    Ok(removed)
}

/// `SystemTime` for a unix-seconds stamp. Used by tests.
#[allow(dead_code)]
fn system_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}
