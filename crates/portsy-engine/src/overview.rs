//! The project overview: every project the user can see, local and remote,
//! with its change standing. This is what a sidebar or a `projects` listing
//! renders.

use std::collections::BTreeMap;
use std::path::Path;

use portsy_meta::MetaStore;
use portsy_types::ProjectSummary;

use crate::engine::SyncEngine;
use crate::error::SyncResult;

impl SyncEngine {
    /// Merge the local scan of `root` with the remote project list into one
    /// overview, sorted case-insensitively by name.
    ///
    /// - Local project, never pushed → `created_locally`, all changes count
    ///   as pending.
    /// - Local + remote → change counts from the diff against the cache,
    ///   HEAD commit id attached.
    /// - Remote only → empty `path`, no local changes.
    pub async fn project_summaries(&self, root: &Path) -> SyncResult<Vec<ProjectSummary>> {
        let mut rows: BTreeMap<String, ProjectSummary> = BTreeMap::new();

        for project in self.scan_local(root).await? {
            rows.insert(
                sort_key(&project.name),
                ProjectSummary {
                    name: project.name,
                    path: project.path,
                    created_locally: true,
                    ..Default::default()
                },
            );
        }

        for doc in self.meta.list_projects().await? {
            match rows.get_mut(&sort_key(&doc.name)) {
                Some(row) => {
                    row.created_locally = false;
                    row.last_commit_id = doc.last_commit_id;
                }
                None => {
                    rows.insert(
                        sort_key(&doc.name),
                        ProjectSummary {
                            name: doc.name,
                            last_commit_id: doc.last_commit_id,
                            ..Default::default()
                        },
                    );
                }
            }
        }

        for change in self.pending_changes(root).await? {
            if let Some(row) = rows.get_mut(&sort_key(&change.name)) {
                row.has_local_changes = true;
                row.added = change.added;
                row.modified = change.modified;
                row.deleted = change.deleted;
            }
        }

        Ok(rows.into_values().collect())
    }

    async fn scan_local(
        &self,
        root: &Path,
    ) -> SyncResult<Vec<portsy_types::AbletonProject>> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || portsy_scan::scan_projects(&root))
            .await
            .map_err(|e| crate::error::SyncError::Worker(e.to_string()))?
            .map_err(Into::into)
    }
}

fn sort_key(name: &str) -> String {
    name.to_ascii_lowercase()
}
