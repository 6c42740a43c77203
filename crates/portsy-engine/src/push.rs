//! Push: diff against the last remote state, upload what is missing,
//! migrate what moved, then run the two-phase commit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use portsy_cache::write_cache_from_state;
use portsy_meta::MetaStore;
use portsy_store::BlobStore;
use portsy_types::{AbletonProject, CommitMeta, FileEntry};

use crate::engine::{StoreVerifier, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::events::Event;

/// What a push did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub commit_id: String,
    /// Content transfers (new or changed bytes).
    pub uploaded: usize,
    /// Server-side copies for key-scheme migration.
    pub migrated: usize,
    /// Entries whose existing blob key was carried forward.
    pub carried: usize,
    pub total_files: usize,
}

/// One unit of blob work for the pool.
enum BlobJob {
    Upload {
        index: usize,
        local: PathBuf,
        key: String,
    },
    Migrate {
        index: usize,
        from: String,
        to: String,
    },
}

impl SyncEngine {
    /// Push a project: scan, upload/migrate blobs, begin + finalize the
    /// commit, rewrite the local cache.
    pub async fn push(
        &self,
        project: &AbletonProject,
        message: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<PushOutcome> {
        self.push_with_commit_id(project, message, None, cancel).await
    }

    /// Like [`SyncEngine::push`] with a caller-supplied commit id, so a
    /// crash-interrupted push can be retried under the same identity and
    /// finalize idempotently.
    pub async fn push_with_commit_id(
        &self,
        project: &AbletonProject,
        message: &str,
        commit_id: Option<String>,
        cancel: &CancellationToken,
    ) -> SyncResult<PushOutcome> {
        let mut current = self.build_state(project).await?;
        current.validate().map_err(|e| {
            SyncError::Worker(format!("scanner produced invalid state: {e}"))
        })?;

        let prev = self.meta.get_latest_state(&project.name).await?;
        let (prev_state, prev_commit) = match prev {
            Some((s, c)) => (Some(s), Some(c)),
            None => (None, None),
        };
        let prev_by_path: HashMap<&str, &FileEntry> = prev_state
            .as_ref()
            .map(|s| s.files.iter().map(|f| (f.path.as_str(), f)).collect())
            .unwrap_or_default();

        // Classify every current entry: carry, migrate, or upload.
        let mut jobs = Vec::new();
        let mut carried = 0usize;
        let project_root = Path::new(&project.path);
        for (index, file) in current.files.iter_mut().enumerate() {
            let desired_key = self.blobs.build_key(&project.name, &file.hash);
            match prev_by_path.get(file.path.as_str()) {
                Some(prev_entry) if prev_entry.hash == file.hash => {
                    match prev_entry.blob_key.as_deref() {
                        Some(existing) if existing == desired_key => {
                            file.blob_key = Some(desired_key);
                            carried += 1;
                        }
                        Some(existing) => jobs.push(BlobJob::Migrate {
                            index,
                            from: existing.to_string(),
                            to: desired_key,
                        }),
                        // Same content but no recorded key (legacy state):
                        // the conditional put dedups server-side.
                        None => jobs.push(BlobJob::Upload {
                            index,
                            local: project_root.join(&file.path),
                            key: desired_key,
                        }),
                    }
                }
                _ => jobs.push(BlobJob::Upload {
                    index,
                    local: project_root.join(&file.path),
                    key: desired_key,
                }),
            }
        }

        let (uploaded, migrated) = self
            .run_blob_jobs(jobs, &mut current.files, cancel)
            .await?;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Two-phase commit. HEAD moves only inside finalize.
        let commit_id = commit_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut commit = CommitMeta::new(commit_id.clone(), message, unix_now());
        commit.user_id = self.options.user_id.clone();
        commit.parent_id = prev_commit.map(|c| c.id);

        self.meta
            .begin_commit(&project.name, &commit, &current)
            .await?;

        if cancel.is_cancelled() {
            // Pending commit and uploaded blobs stay for the retry.
            return Err(SyncError::Cancelled);
        }

        let verifier = StoreVerifier {
            blobs: Arc::clone(&self.blobs),
            project: project.name.clone(),
        };
        self.meta
            .finalize_commit(&project.name, &commit, &current, &verifier)
            .await?;

        // The push is committed; the cache rewrite records it locally.
        let root = project_root.to_path_buf();
        let state_for_cache = current.clone();
        tokio::task::spawn_blocking(move || write_cache_from_state(&root, &state_for_cache))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))??;

        info!(
            project = %project.name,
            commit = %commit_id,
            uploaded,
            migrated,
            carried,
            "push complete"
        );
        self.emit(Event::PushDone {
            project: project.name.clone(),
        });

        Ok(PushOutcome {
            commit_id,
            uploaded,
            migrated,
            carried,
            total_files: current.len(),
        })
    }

    /// Run upload/migrate jobs through the bounded pool. The first error
    /// cancels the remaining jobs and is returned; finished operations
    /// stay (they are idempotent on retry). Returns (uploads, migrations)
    /// and assigns each completed job's key into `files`.
    async fn run_blob_jobs(
        &self,
        jobs: Vec<BlobJob>,
        files: &mut [FileEntry],
        cancel: &CancellationToken,
    ) -> SyncResult<(usize, usize)> {
        let mut uploaded = 0usize;
        let mut migrated = 0usize;
        if jobs.is_empty() {
            return Ok((uploaded, migrated));
        }

        let pool_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut set: JoinSet<SyncResult<(usize, String, bool)>> = JoinSet::new();

        for job in jobs {
            let blobs = Arc::clone(&self.blobs);
            let semaphore = Arc::clone(&semaphore);
            let token = pool_cancel.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| SyncError::Worker(e.to_string()))?;
                if token.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                match job {
                    BlobJob::Upload { index, local, key } => {
                        debug!(key = %key, "uploading");
                        blobs.upload_if_missing(&local, &key).await?;
                        Ok((index, key, false))
                    }
                    BlobJob::Migrate { index, from, to } => {
                        debug!(from = %from, to = %to, "migrating key");
                        blobs.copy_if_missing(&from, &to).await?;
                        Ok((index, to, true))
                    }
                }
            });
        }

        let mut first_error: Option<SyncError> = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| SyncError::Worker(e.to_string()))?;
            match result {
                Ok((index, key, was_migration)) => {
                    files[index].blob_key = Some(key);
                    if was_migration {
                        migrated += 1;
                    } else {
                        uploaded += 1;
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        pool_cancel.cancel();
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            // Cancelled workers only ever follow a real error or an outer
            // cancellation; prefer reporting the cause.
            Some(SyncError::Cancelled) if cancel.is_cancelled() => Err(SyncError::Cancelled),
            Some(err) => Err(err),
            None => Ok((uploaded, migrated)),
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
