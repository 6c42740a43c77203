//! Deterministic project scanning.
//!
//! The scanner walks a project tree depth-first, filters engine-owned and
//! junk paths, normalizes every relative path, and returns entries sorted by
//! path so downstream diffs behave the same on every run and every platform.

pub mod error;
pub mod manifest;
pub mod projects;
pub mod walk;

pub use error::{ScanError, ScanResult};
pub use manifest::build_manifest;
pub use projects::{resolve_session_file, scan_projects};
pub use walk::{walk_project, ScannedFile};
