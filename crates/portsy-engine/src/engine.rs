use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use portsy_als::{compute_logical_diff, gunzip_capped, AlsLogicalDiff, MAX_DECOMPRESSED_BYTES};
use portsy_cache::LocalCache;
use portsy_diff::{changed_projects, diff_manifests, ChangeKind, ManifestDiff};
use portsy_hash::Hasher;
use portsy_meta::{BlobVerifier, MetaResult, MetaStore};
use portsy_scan::build_manifest;
use portsy_store::BlobStore;
use portsy_types::{
    AbletonProject, CasePolicy, HashAlgo, ProjectChange, ProjectState,
};

use crate::error::{SyncError, SyncResult};
use crate::events::{Event, EventSink, NullSink};

/// Engine-wide knobs.
#[derive(Clone, Debug)]
pub struct SyncEngineOptions {
    /// Digest algorithm for every manifest this engine builds.
    pub algo: HashAlgo,
    /// Manifest key case policy; defaults to the host filesystem's.
    pub case_policy: CasePolicy,
    /// Bounded worker pool size for uploads and downloads.
    pub workers: usize,
    /// Recorded on commits this engine creates.
    pub user_id: Option<String>,
}

impl Default for SyncEngineOptions {
    fn default() -> Self {
        Self {
            algo: HashAlgo::default(),
            case_policy: CasePolicy::for_host(),
            workers: default_workers(),
            user_id: None,
        }
    }
}

/// Default transfer parallelism: half the cores, floor of two.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(2)
        .max(2)
}

/// The engine: store handles, options, and the active watcher's
/// cancellation slot. One per process; all state is scoped here rather
/// than in globals.
pub struct SyncEngine {
    pub(crate) meta: Arc<dyn MetaStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) options: SyncEngineOptions,
    watcher_cancel: Mutex<Option<CancellationToken>>,
}

impl SyncEngine {
    pub fn new(meta: Arc<dyn MetaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_options(meta, blobs, Arc::new(NullSink), SyncEngineOptions::default())
    }

    pub fn with_options(
        meta: Arc<dyn MetaStore>,
        blobs: Arc<dyn BlobStore>,
        events: Arc<dyn EventSink>,
        options: SyncEngineOptions,
    ) -> Self {
        Self {
            meta,
            blobs,
            events,
            options,
            watcher_cancel: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &SyncEngineOptions {
        &self.options
    }

    pub fn meta(&self) -> &Arc<dyn MetaStore> {
        &self.meta
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub(crate) fn hasher(&self) -> Hasher {
        Hasher::new(self.options.algo)
    }

    /// Put an event on the bus. The engine emits `project:diff` and
    /// `pushDone` itself; the watcher owner forwards `alsSaved`.
    pub fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    /// Build the current manifest for a project off the async runtime.
    pub(crate) async fn build_state(&self, project: &AbletonProject) -> SyncResult<ProjectState> {
        let root = Path::new(&project.path).to_path_buf();
        let name = project.name.clone();
        let algo = self.options.algo;
        let policy = self.options.case_policy;
        let state = tokio::task::spawn_blocking(move || {
            build_manifest(&root, &name, algo, policy)
        })
        .await
        .map_err(|e| SyncError::Worker(e.to_string()))??;
        Ok(state)
    }

    // ---- Change tracking ----

    /// Per-project pending-change summaries for every project under `root`.
    pub async fn pending_changes(&self, root: &Path) -> SyncResult<Vec<ProjectChange>> {
        let root = root.to_path_buf();
        let algo = self.options.algo;
        let policy = self.options.case_policy;
        let changes = tokio::task::spawn_blocking(move || changed_projects(&root, algo, policy))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
            .map_err(|e| match e {
                portsy_diff::DiffError::Scan(e) => SyncError::Scan(e),
                portsy_diff::DiffError::Cache(e) => SyncError::Cache(e),
            })?;
        Ok(changes)
    }

    /// Diff one project against its local cache, with best-effort session
    /// enrichment, and emit a `project:diff` event.
    pub async fn diff_project(
        &self,
        project: &AbletonProject,
    ) -> SyncResult<(ManifestDiff, Option<AlsLogicalDiff>)> {
        let current = self.build_state(project).await?;
        let project_root = Path::new(&project.path);
        let cache = LocalCache::load(project_root, self.options.case_policy)?;
        let diff = diff_manifests(&current.manifest(), &cache.manifest);

        let logical = self
            .logical_enrichment(project, &current, &cache, &diff)
            .await;

        self.emit(Event::ProjectDiff {
            project: project.name.clone(),
            added: diff.paths(ChangeKind::Added),
            modified: diff.paths(ChangeKind::Modified),
            deleted: diff.paths(ChangeKind::Deleted),
        });
        Ok((diff, logical))
    }

    /// Session-level enrichment of a manifest diff. Any failure along the
    /// way (no session, blob gone, oversized previous revision) degrades to
    /// `None` — the manifest diff always stands on its own.
    async fn logical_enrichment(
        &self,
        project: &AbletonProject,
        current: &ProjectState,
        cache: &LocalCache,
        diff: &ManifestDiff,
    ) -> Option<AlsLogicalDiff> {
        let manifest = current.manifest();
        let als_rel = portsy_als::top_level_als(manifest.keys().map(String::as_str))?;

        // Only worth computing when the session itself changed (or was
        // never cached).
        let prev_hash_for_als = cache.manifest.get(&als_rel);
        let als_changed = prev_hash_for_als.is_none()
            || diff.changes.iter().any(|c| c.path == als_rel);
        if !als_changed {
            return None;
        }

        let prev_xml = match prev_hash_for_als {
            Some(prev_sha) => {
                let key = self.blobs.build_key(&project.name, prev_sha);
                match self.blobs.download_bytes(&key).await {
                    Ok(gz) => match gunzip_capped(gz.as_ref(), MAX_DECOMPRESSED_BYTES) {
                        Ok(Some(xml)) => Some(xml),
                        Ok(None) => {
                            debug!(project = %project.name, "previous session over size cap; skipping prior side");
                            None
                        }
                        Err(err) => {
                            debug!(project = %project.name, error = %err, "previous session unreadable");
                            None
                        }
                    },
                    Err(err) => {
                        debug!(project = %project.name, error = %err, "previous session blob unavailable");
                        None
                    }
                }
            }
            None => None,
        };

        let project_root = Path::new(&project.path).to_path_buf();
        let als_path = project_root.join(&als_rel);
        let hasher = self.hasher();
        let cached_manifest = cache.manifest.clone();
        tokio::task::spawn_blocking(move || {
            compute_logical_diff(
                prev_xml.as_deref(),
                &als_path,
                &project_root,
                &hasher,
                &|rel| cached_manifest.get(rel).cloned(),
            )
            .ok()
        })
        .await
        .ok()
        .flatten()
    }

    // ---- Watcher handle ----

    /// Park the cancellation handle of the active watcher. Any previous
    /// watcher is cancelled first.
    pub fn set_watcher(&self, token: CancellationToken) {
        let mut slot = self.watcher_cancel.lock().expect("lock poisoned");
        if let Some(old) = slot.replace(token) {
            old.cancel();
        }
    }

    /// Stop the active watcher, if any.
    pub fn stop_watcher(&self) {
        if let Some(token) = self.watcher_cancel.lock().expect("lock poisoned").take() {
            token.cancel();
            self.emit(Event::Log("watcher stopped".into()));
        }
    }

    pub fn watching(&self) -> bool {
        self.watcher_cancel.lock().expect("lock poisoned").is_some()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(token) = self.watcher_cancel.lock().expect("lock poisoned").take() {
            token.cancel();
        }
    }
}

/// Finalize-time verification over the blob store and key scheme.
pub(crate) struct StoreVerifier {
    pub blobs: Arc<dyn BlobStore>,
    pub project: String,
}

#[async_trait]
impl BlobVerifier for StoreVerifier {
    async fn blob_exists(&self, hash_hex: &str) -> MetaResult<bool> {
        let key = self.blobs.build_key(&self.project, hash_hex);
        self.blobs
            .exists(&key)
            .await
            .map_err(|e| portsy_meta::MetaError::Network(e.to_string()))
    }
}
