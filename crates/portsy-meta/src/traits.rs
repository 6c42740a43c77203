use async_trait::async_trait;

use portsy_types::{CommitMeta, CommitStatus, ProjectDoc, ProjectState};

use crate::error::MetaResult;

/// Answers "does a live blob exist for this content hash" at finalize time.
///
/// The sync engine implements this over the blob store and the project's
/// key scheme; tests implement it over a set.
#[async_trait]
pub trait BlobVerifier: Send + Sync {
    async fn blob_exists(&self, hash_hex: &str) -> MetaResult<bool>;
}

/// Durable project metadata with a two-phase commit protocol.
///
/// Document layout, per project:
///
/// ```text
/// projects/<name>                  -> ProjectDoc (HEAD pointer)
/// projects/<name>/commits/<id>     -> CommitMeta
/// projects/<name>/states/<id>      -> ProjectState
/// ```
///
/// Contracts:
/// - `begin_commit` writes the commit as `pending` plus its state in one
///   batch and never touches HEAD.
/// - `finalize_commit` verifies every referenced blob **outside** any
///   transaction, then atomically (reads before writes) marks the commit
///   `final`, writes the state, and advances HEAD. It is idempotent: re-run
///   with the same `(commit.id, state)` after a crash, it completes the
///   same HEAD advance without corruption.
/// - Unknown fields on stored documents are preserved across merges.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Legacy one-phase write: commit, state, and HEAD merge in one go, no
    /// blob verification. Retained for single-writer pushes and self-tests.
    async fn upsert_latest_state(
        &self,
        project: &str,
        state: &ProjectState,
        commit: &CommitMeta,
    ) -> MetaResult<()>;

    async fn begin_commit(
        &self,
        project: &str,
        commit: &CommitMeta,
        state: &ProjectState,
    ) -> MetaResult<()>;

    async fn finalize_commit(
        &self,
        project: &str,
        commit: &CommitMeta,
        state: &ProjectState,
        verify: &dyn BlobVerifier,
    ) -> MetaResult<()>;

    /// The state and commit HEAD points at; `None` for an unknown project
    /// or one that has never finalized.
    async fn get_latest_state(
        &self,
        project: &str,
    ) -> MetaResult<Option<(ProjectState, CommitMeta)>>;

    async fn get_state_by_commit(
        &self,
        project: &str,
        commit_id: &str,
    ) -> MetaResult<(ProjectState, CommitMeta)>;

    async fn list_projects(&self) -> MetaResult<Vec<ProjectDoc>>;

    /// Most recent first, capped at `limit`.
    async fn get_commit_history(&self, project: &str, limit: usize)
        -> MetaResult<Vec<CommitMeta>>;
}

/// Shared helper: a commit stamped `final` for the finalize write.
pub(crate) fn finalized(commit: &CommitMeta) -> CommitMeta {
    let mut c = commit.clone();
    c.status = CommitStatus::Final;
    c
}

/// Shared helper: a commit stamped `pending` for the begin write.
pub(crate) fn pending(commit: &CommitMeta) -> CommitMeta {
    let mut c = commit.clone();
    c.status = CommitStatus::Pending;
    c
}

/// Run the finalize-time blob verification for a state.
pub(crate) async fn verify_state_blobs(
    state: &ProjectState,
    verify: &dyn BlobVerifier,
) -> MetaResult<()> {
    for entry in &state.files {
        if !verify.blob_exists(&entry.hash).await? {
            return Err(crate::error::MetaError::BlobMissing(entry.hash.clone()));
        }
    }
    Ok(())
}
