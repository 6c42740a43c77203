use std::path::{Path, PathBuf};

use portsy_types::AbletonProject;

use crate::error::{ScanError, ScanResult};

/// Find the session file tracked for a project directory.
///
/// Prefers `<FolderName>.als` (case-insensitive); otherwise picks the
/// lexicographically smallest top-level `.als` (case-insensitive) so
/// repeated scans always resolve the same file. Editor droppings
/// (`*.als~`, `*.als.tmp`) are not session files.
pub fn resolve_session_file(project_path: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(String, PathBuf)> = std::fs::read_dir(project_path)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".als") && !lower.ends_with(".als~") && !lower.ends_with(".als.tmp")
            {
                Some((lower, e.path()))
            } else {
                None
            }
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }

    if let Some(folder) = project_path.file_name() {
        let preferred = format!("{}.als", folder.to_string_lossy()).to_ascii_lowercase();
        if let Some((_, path)) = candidates.iter().find(|(lower, _)| *lower == preferred) {
            return Some(path.clone());
        }
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    Some(candidates.remove(0).1)
}

/// Scan `root` for projects: immediate child directories holding at least
/// one top-level `.als`. Unreadable children are skipped; the result is
/// sorted case-insensitively by name.
pub fn scan_projects(root: &Path) -> ScanResult<Vec<AbletonProject>> {
    let entries = std::fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut projects = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let project_path = entry.path();
        let Some(als_path) = resolve_session_file(&project_path) else {
            continue;
        };

        let has_portsy = project_path.join(".portsy").is_dir();
        projects.push(AbletonProject {
            name: entry.file_name().to_string_lossy().to_string(),
            path: project_path.to_string_lossy().replace('\\', "/"),
            als_file: als_path.to_string_lossy().replace('\\', "/"),
            has_portsy,
        });
    }

    projects.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project(root: &Path, name: &str, als: &[&str]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for a in als {
            fs::write(dir.join(a), b"gz").unwrap();
        }
        dir
    }

    #[test]
    fn prefers_folder_name_als() {
        let root = tempfile::tempdir().unwrap();
        let dir = project(root.path(), "MySet", &["aaa.als", "MySet.als", "zzz.als"]);
        let resolved = resolve_session_file(&dir).unwrap();
        assert_eq!(resolved.file_name().unwrap().to_string_lossy(), "MySet.als");
    }

    #[test]
    fn folder_name_match_is_case_insensitive() {
        let root = tempfile::tempdir().unwrap();
        let dir = project(root.path(), "MySet", &["myset.ALS", "aaa.als"]);
        let resolved = resolve_session_file(&dir).unwrap();
        assert_eq!(resolved.file_name().unwrap().to_string_lossy(), "myset.ALS");
    }

    #[test]
    fn falls_back_to_smallest_candidate() {
        let root = tempfile::tempdir().unwrap();
        let dir = project(root.path(), "Set", &["b.als", "A.als"]);
        let resolved = resolve_session_file(&dir).unwrap();
        assert_eq!(resolved.file_name().unwrap().to_string_lossy(), "A.als");
    }

    #[test]
    fn ignores_editor_droppings() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("Set");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Set.als~"), b"x").unwrap();
        fs::write(dir.join("Set.als.tmp"), b"x").unwrap();
        assert!(resolve_session_file(&dir).is_none());
    }

    #[test]
    fn scan_finds_only_als_holding_dirs() {
        let root = tempfile::tempdir().unwrap();
        project(root.path(), "Beta", &["Beta.als"]);
        project(root.path(), "alpha", &["alpha.als"]);
        fs::create_dir(root.path().join("NotAProject")).unwrap();
        fs::write(root.path().join("loose.als"), b"x").unwrap();

        let projects = scan_projects(root.path()).unwrap();
        let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Beta"]);
        assert!(!projects[0].has_portsy);
    }

    #[test]
    fn scan_reports_portsy_presence() {
        let root = tempfile::tempdir().unwrap();
        let dir = project(root.path(), "Set", &["Set.als"]);
        fs::create_dir(dir.join(".portsy")).unwrap();
        let projects = scan_projects(root.path()).unwrap();
        assert!(projects[0].has_portsy);
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(scan_projects(Path::new("/nonexistent/root-xyz")).is_err());
    }
}
