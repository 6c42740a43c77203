use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use portsy_types::{CommitMeta, ProjectDoc, ProjectState};

use crate::error::{MetaError, MetaResult};
use crate::traits::{finalized, pending, verify_state_blobs, BlobVerifier, MetaStore};

/// Metadata store backed by a local directory of JSON documents.
///
/// Layout mirrors the logical document tree:
///
/// ```text
/// <root>/projects/<name>/project.json
/// <root>/projects/<name>/commits/<id>.json
/// <root>/projects/<name>/states/<id>.json
/// ```
///
/// A process-level mutex serializes transactions (the engine assumes a
/// single writer per project anyway), and every document write is atomic
/// (tmp + rename), so a crash never leaves a torn document.
pub struct FsMetaStore {
    root: PathBuf,
    txn: Mutex<()>,
}

impl FsMetaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            txn: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join("projects").join(project)
    }

    fn doc_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("project.json")
    }

    fn commit_path(&self, project: &str, id: &str) -> PathBuf {
        self.project_dir(project).join("commits").join(format!("{id}.json"))
    }

    fn state_path(&self, project: &str, id: &str) -> PathBuf {
        self.project_dir(project).join("states").join(format!("{id}.json"))
    }
}

fn write_doc<T: serde::Serialize>(path: &Path, doc: &T) -> MetaResult<()> {
    let bytes =
        serde_json::to_vec_pretty(doc).map_err(|e| MetaError::CorruptDoc(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn read_doc<T: serde::de::DeserializeOwned>(path: &Path) -> MetaResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| MetaError::CorruptDoc(format!("{}: {e}", path.display())))
}

/// Merge `fields` over the JSON object at `path`, preserving keys the
/// engine does not know about.
fn merge_doc(path: &Path, fields: Value) -> MetaResult<()> {
    let mut doc: Map<String, Value> = read_doc(path)?.unwrap_or_default();
    if let Value::Object(fields) = fields {
        for (k, v) in fields {
            doc.insert(k, v);
        }
    }
    write_doc(path, &Value::Object(doc))
}

#[async_trait]
impl MetaStore for FsMetaStore {
    async fn upsert_latest_state(
        &self,
        project: &str,
        state: &ProjectState,
        commit: &CommitMeta,
    ) -> MetaResult<()> {
        let _guard = self.txn.lock().await;
        merge_doc(
            &self.doc_path(project),
            serde_json::json!({
                "name": project,
                "lastCommitId": commit.id,
                "lastCommitAt": commit.timestamp,
            }),
        )?;
        write_doc(&self.commit_path(project, &commit.id), commit)?;
        write_doc(&self.state_path(project, &commit.id), state)?;
        Ok(())
    }

    async fn begin_commit(
        &self,
        project: &str,
        commit: &CommitMeta,
        state: &ProjectState,
    ) -> MetaResult<()> {
        let commit = pending(commit);
        let _guard = self.txn.lock().await;
        merge_doc(&self.doc_path(project), serde_json::json!({ "name": project }))?;
        write_doc(&self.commit_path(project, &commit.id), &commit)?;
        write_doc(&self.state_path(project, &commit.id), state)?;
        debug!(project, commit = %commit.id, "begin commit (pending)");
        Ok(())
    }

    async fn finalize_commit(
        &self,
        project: &str,
        commit: &CommitMeta,
        state: &ProjectState,
        verify: &dyn BlobVerifier,
    ) -> MetaResult<()> {
        // Verification stays outside the transaction guard.
        verify_state_blobs(state, verify).await?;

        let commit = finalized(commit);
        let _guard = self.txn.lock().await;

        // Read (before any write) the current HEAD document.
        let mut doc: ProjectDoc = read_doc(&self.doc_path(project))?
            .unwrap_or_else(|| ProjectDoc::new(project));
        doc.name = project.to_string();
        doc.push_commit(&commit.id, commit.timestamp);

        write_doc(&self.commit_path(project, &commit.id), &commit)?;
        write_doc(&self.state_path(project, &commit.id), state)?;
        merge_doc(
            &self.doc_path(project),
            serde_json::to_value(&doc).map_err(|e| MetaError::CorruptDoc(e.to_string()))?,
        )?;
        debug!(project, commit = %commit.id, "finalized; HEAD advanced");
        Ok(())
    }

    async fn get_latest_state(
        &self,
        project: &str,
    ) -> MetaResult<Option<(ProjectState, CommitMeta)>> {
        let Some(doc) = read_doc::<ProjectDoc>(&self.doc_path(project))? else {
            return Ok(None);
        };
        let Some(head) = doc.last_commit_id else {
            return Ok(None);
        };
        let commit = read_doc(&self.commit_path(project, &head))?
            .ok_or_else(|| MetaError::CorruptDoc(format!("HEAD {head} has no commit doc")))?;
        let state = read_doc(&self.state_path(project, &head))?
            .ok_or_else(|| MetaError::CorruptDoc(format!("HEAD {head} has no state doc")))?;
        Ok(Some((state, commit)))
    }

    async fn get_state_by_commit(
        &self,
        project: &str,
        commit_id: &str,
    ) -> MetaResult<(ProjectState, CommitMeta)> {
        let not_found = || MetaError::NoSuchState {
            project: project.to_string(),
            commit: Some(commit_id.to_string()),
        };
        let state = read_doc(&self.state_path(project, commit_id))?.ok_or_else(not_found)?;
        let commit = read_doc(&self.commit_path(project, commit_id))?.ok_or_else(not_found)?;
        Ok((state, commit))
    }

    async fn list_projects(&self) -> MetaResult<Vec<ProjectDoc>> {
        let projects_dir = self.root.join("projects");
        let entries = match fs::read_dir(&projects_dir) {
            Ok(e) => e,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut docs = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(doc) = read_doc::<ProjectDoc>(&self.doc_path(&name))? {
                docs.push(doc);
            }
        }
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }

    async fn get_commit_history(
        &self,
        project: &str,
        limit: usize,
    ) -> MetaResult<Vec<CommitMeta>> {
        let commits_dir = self.project_dir(project).join("commits");
        let entries = match fs::read_dir(&commits_dir) {
            Ok(e) => e,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut commits = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            if let Some(commit) = read_doc::<CommitMeta>(&entry.path())? {
                commits.push(commit);
            }
        }
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        commits.truncate(limit);
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portsy_types::{CommitStatus, FileEntry, HashAlgo};

    struct AlwaysThere;

    #[async_trait]
    impl BlobVerifier for AlwaysThere {
        async fn blob_exists(&self, _hash_hex: &str) -> MetaResult<bool> {
            Ok(true)
        }
    }

    fn state() -> ProjectState {
        ProjectState::new(
            "proj",
            "/tmp/proj",
            HashAlgo::Sha256,
            vec![FileEntry::new("a.als", "h1", 1, 0)],
            100,
        )
    }

    #[tokio::test]
    async fn two_phase_commit_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetaStore::new(dir.path());
        let st = state();
        let c = CommitMeta::new("c1", "init", 10);

        store.begin_commit("proj", &c, &st).await.unwrap();
        assert!(store.get_latest_state("proj").await.unwrap().is_none());

        store.finalize_commit("proj", &c, &st, &AlwaysThere).await.unwrap();
        let (got_state, got_commit) = store.get_latest_state("proj").await.unwrap().unwrap();
        assert_eq!(got_commit.status, CommitStatus::Final);
        assert_eq!(got_state.manifest(), st.manifest());
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsMetaStore::new(dir.path());
            let c = CommitMeta::new("c1", "init", 10);
            store.begin_commit("proj", &c, &state()).await.unwrap();
            store
                .finalize_commit("proj", &c, &state(), &AlwaysThere)
                .await
                .unwrap();
        }
        let store = FsMetaStore::new(dir.path());
        let (_, c) = store.get_latest_state("proj").await.unwrap().unwrap();
        assert_eq!(c.id, "c1");
        let docs = store.list_projects().await.unwrap();
        assert_eq!(docs[0].last5, vec!["c1"]);
    }

    #[tokio::test]
    async fn unknown_doc_fields_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetaStore::new(dir.path());
        merge_doc(
            &store.doc_path("proj"),
            serde_json::json!({ "name": "proj", "externalField": 42 }),
        )
        .unwrap();

        let c = CommitMeta::new("c1", "m", 10);
        store
            .finalize_commit("proj", &c, &state(), &AlwaysThere)
            .await
            .unwrap();

        let raw: Map<String, Value> = read_doc(&store.doc_path("proj")).unwrap().unwrap();
        assert_eq!(raw.get("externalField"), Some(&Value::Number(42.into())));
        assert_eq!(raw.get("lastCommitId"), Some(&Value::String("c1".into())));
    }

    #[tokio::test]
    async fn history_ordering_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetaStore::new(dir.path());
        for (id, ts) in [("a", 1), ("b", 3), ("c", 2)] {
            let c = CommitMeta::new(id, "m", ts);
            store.begin_commit("proj", &c, &state()).await.unwrap();
            store
                .finalize_commit("proj", &c, &state(), &AlwaysThere)
                .await
                .unwrap();
        }
        let history = store.get_commit_history("proj", 10).await.unwrap();
        let ids: Vec<_> = history.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let capped = store.get_commit_history("proj", 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn finalize_after_crash_completes_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let c = CommitMeta::new("c1", "interrupted", 10);
        {
            // "Crash" after begin: the pending record is on disk, HEAD not.
            let store = FsMetaStore::new(dir.path());
            store.begin_commit("proj", &c, &state()).await.unwrap();
        }

        let store = FsMetaStore::new(dir.path());
        assert!(store.get_latest_state("proj").await.unwrap().is_none());
        let (_, pending) = store.get_state_by_commit("proj", "c1").await.unwrap();
        assert_eq!(pending.status, CommitStatus::Pending);

        store
            .finalize_commit("proj", &c, &state(), &AlwaysThere)
            .await
            .unwrap();
        let (_, finalized) = store.get_latest_state("proj").await.unwrap().unwrap();
        assert_eq!(finalized.id, "c1");
        assert_eq!(finalized.status, CommitStatus::Final);
    }

    #[tokio::test]
    async fn missing_lookups_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMetaStore::new(dir.path());
        assert!(store.get_latest_state("ghost").await.unwrap().is_none());
        let err = store.get_state_by_commit("ghost", "c").await.unwrap_err();
        assert!(matches!(err, MetaError::NoSuchState { .. }));
    }
}
