use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use portsy_types::{CommitMeta, ProjectDoc, ProjectState};

use crate::error::{MetaError, MetaResult};
use crate::traits::{finalized, pending, verify_state_blobs, BlobVerifier, MetaStore};

/// In-memory metadata store for tests and embedding.
///
/// Documents are held as JSON maps, not typed structs, so fields this
/// engine does not know about survive merges — the same behavior a
/// document database gives the original. The write lock is the
/// transaction: finalize's read-modify-write of the project doc happens
/// under one guard.
#[derive(Default)]
pub struct MemoryMetaStore {
    inner: RwLock<HashMap<String, ProjectRecord>>,
}

#[derive(Default)]
struct ProjectRecord {
    doc: Map<String, Value>,
    commits: HashMap<String, Value>,
    states: HashMap<String, Value>,
}

fn to_value<T: serde::Serialize>(v: &T) -> Value {
    serde_json::to_value(v).expect("document types serialize")
}

fn from_value<T: serde::de::DeserializeOwned>(v: &Value) -> MetaResult<T> {
    serde_json::from_value(v.clone()).map_err(|e| MetaError::CorruptDoc(e.to_string()))
}

/// Merge `fields` into `doc`, leaving unmentioned keys untouched.
fn merge_into(doc: &mut Map<String, Value>, fields: Value) {
    if let Value::Object(fields) = fields {
        for (k, v) in fields {
            doc.insert(k, v);
        }
    }
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw commit record, regardless of status. Test hook.
    pub fn commit(&self, project: &str, commit_id: &str) -> Option<CommitMeta> {
        let map = self.inner.read().expect("lock poisoned");
        let value = map.get(project)?.commits.get(commit_id)?;
        from_value(value).ok()
    }

    /// Number of commit records for a project. Test hook.
    pub fn commit_count(&self, project: &str) -> usize {
        let map = self.inner.read().expect("lock poisoned");
        map.get(project).map(|r| r.commits.len()).unwrap_or(0)
    }

    fn read_doc(record: &ProjectRecord) -> MetaResult<ProjectDoc> {
        from_value(&Value::Object(record.doc.clone()))
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn upsert_latest_state(
        &self,
        project: &str,
        state: &ProjectState,
        commit: &CommitMeta,
    ) -> MetaResult<()> {
        let mut map = self.inner.write().expect("lock poisoned");
        let record = map.entry(project.to_string()).or_default();
        merge_into(
            &mut record.doc,
            serde_json::json!({
                "name": project,
                "lastCommitId": commit.id,
                "lastCommitAt": commit.timestamp,
            }),
        );
        record.commits.insert(commit.id.clone(), to_value(commit));
        record.states.insert(commit.id.clone(), to_value(state));
        Ok(())
    }

    async fn begin_commit(
        &self,
        project: &str,
        commit: &CommitMeta,
        state: &ProjectState,
    ) -> MetaResult<()> {
        let commit = pending(commit);
        let mut map = self.inner.write().expect("lock poisoned");
        let record = map.entry(project.to_string()).or_default();
        // Ensure the project doc exists without clobbering HEAD fields.
        merge_into(&mut record.doc, serde_json::json!({ "name": project }));
        record.commits.insert(commit.id.clone(), to_value(&commit));
        record.states.insert(commit.id.clone(), to_value(state));
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
        // Phase 1, outside the transaction: every referenced blob must be
        // live before HEAD can point at this state.
        verify_state_blobs(state, verify).await?;

        // Phase 2: one write guard = one transaction. Read the doc first,
        // then only write.
        let commit = finalized(commit);
        let mut map = self.inner.write().expect("lock poisoned");
        let record = map.entry(project.to_string()).or_default();

        let mut doc = if record.doc.is_empty() {
            ProjectDoc::new(project)
        } else {
            Self::read_doc(record)?
        };
        doc.name = project.to_string();
        doc.push_commit(&commit.id, commit.timestamp);

        record.commits.insert(commit.id.clone(), to_value(&commit));
        record.states.insert(commit.id.clone(), to_value(state));
        merge_into(&mut record.doc, to_value(&doc));
        debug!(project, commit = %commit.id, "finalized; HEAD advanced");
        Ok(())
    }

    async fn get_latest_state(
        &self,
        project: &str,
    ) -> MetaResult<Option<(ProjectState, CommitMeta)>> {
        let map = self.inner.read().expect("lock poisoned");
        let Some(record) = map.get(project) else {
            return Ok(None);
        };
        let doc = Self::read_doc(record)?;
        let Some(head) = doc.last_commit_id else {
            return Ok(None);
        };
        let commit = record
            .commits
            .get(&head)
            .ok_or_else(|| MetaError::CorruptDoc(format!("HEAD {head} has no commit doc")))?;
        let state = record
            .states
            .get(&head)
            .ok_or_else(|| MetaError::CorruptDoc(format!("HEAD {head} has no state doc")))?;
        Ok(Some((from_value(state)?, from_value(commit)?)))
    }

    async fn get_state_by_commit(
        &self,
        project: &str,
        commit_id: &str,
    ) -> MetaResult<(ProjectState, CommitMeta)> {
        let map = self.inner.read().expect("lock poisoned");
        let record = map.get(project).ok_or_else(|| MetaError::NoSuchState {
            project: project.to_string(),
            commit: Some(commit_id.to_string()),
        })?;
        match (record.states.get(commit_id), record.commits.get(commit_id)) {
            (Some(state), Some(commit)) => Ok((from_value(state)?, from_value(commit)?)),
            _ => Err(MetaError::NoSuchState {
                project: project.to_string(),
                commit: Some(commit_id.to_string()),
            }),
        }
    }

    async fn list_projects(&self) -> MetaResult<Vec<ProjectDoc>> {
        let map = self.inner.read().expect("lock poisoned");
        let mut docs = Vec::with_capacity(map.len());
        for record in map.values() {
            docs.push(Self::read_doc(record)?);
        }
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }

    async fn get_commit_history(
        &self,
        project: &str,
        limit: usize,
    ) -> MetaResult<Vec<CommitMeta>> {
        let map = self.inner.read().expect("lock poisoned");
        let Some(record) = map.get(project) else {
            return Ok(Vec::new());
        };
        let mut commits: Vec<CommitMeta> = record
            .commits
            .values()
            .map(from_value)
            .collect::<MetaResult<_>>()?;
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        commits.truncate(limit);
        Ok(commits)
    }
}
