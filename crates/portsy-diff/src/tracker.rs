use std::path::Path;

use tracing::debug;

use portsy_cache::LocalCache;
use portsy_scan::{build_manifest, scan_projects};
use portsy_types::{CasePolicy, HashAlgo, ProjectChange};

use crate::error::DiffResult;
use crate::manifest_diff::diff_manifests;

/// Scan every project under `root`, diff each current manifest against its
/// local cache, and return summaries for the projects that changed.
///
/// Projects whose manifest cannot be built (vanished mid-scan, unreadable)
/// are skipped; zero-change projects are omitted. The result inherits the
/// deterministic ordering of the project scan.
pub fn changed_projects(
    root: &Path,
    algo: HashAlgo,
    policy: CasePolicy,
) -> DiffResult<Vec<ProjectChange>> {
    let projects = scan_projects(root)?;

    let mut out = Vec::new();
    for project in projects {
        let project_path = Path::new(&project.path);
        let state = match build_manifest(project_path, &project.name, algo, policy) {
            Ok(s) => s,
            Err(err) => {
                debug!(project = %project.name, error = %err, "skipping: manifest build failed");
                continue;
            }
        };
        let cache = LocalCache::load(project_path, policy)?;
        let diff = diff_manifests(&state.manifest(), &cache.manifest);
        if diff.is_empty() {
            continue;
        }

        out.push(ProjectChange {
            name: project.name,
            path: project.path,
            added: diff.added(),
            modified: diff.modified(),
            deleted: diff.deleted(),
            total: diff.len(),
        });
    }
    Ok(out)
}
