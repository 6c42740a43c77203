//! Structural diffing between manifests.
//!
//! [`diff_manifests`] is a pure function over two `{path → hash}` maps; the
//! [`tracker`] module aggregates scanner + cache + diff across a root into
//! per-project change summaries.

pub mod error;
pub mod manifest_diff;
pub mod tracker;

pub use error::{DiffError, DiffResult};
pub use manifest_diff::{diff_manifests, ChangeKind, FileChange, ManifestDiff};
pub use tracker::changed_projects;
