//! Manifest path normalization.
//!
//! Every path stored in a manifest, cache, or state uses forward slashes and,
//! on case-insensitive filesystems, lowercase ASCII. Normalizing at the
//! scanner boundary means diffs and cache lookups never see two spellings of
//! the same logical path.

use serde::{Deserialize, Serialize};

/// How manifest keys treat letter case.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicy {
    /// Keep paths as spelled on disk (case-sensitive filesystems).
    #[default]
    Preserve,
    /// Lowercase ASCII letters (NTFS / APFS-default semantics).
    Fold,
}

impl CasePolicy {
    /// The policy matching the host filesystem's usual behavior.
    ///
    /// Windows (NTFS) and macOS (APFS default) are case-insensitive; callers
    /// that know better can pick a policy explicitly.
    pub fn for_host() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Self::Fold
        } else {
            Self::Preserve
        }
    }

    /// Apply this policy to one path string.
    pub fn apply(&self, path: &str) -> String {
        match self {
            Self::Preserve => path.to_string(),
            Self::Fold => lower_ascii(path),
        }
    }
}

/// Normalize a project-relative path for use as a manifest key.
///
/// Backslashes become forward slashes, an accidental leading `./` is
/// trimmed, and the case policy is applied.
pub fn normalize_rel(path: &str, policy: CasePolicy) -> String {
    let mut p = path.replace('\\', "/");
    if let Some(stripped) = p.strip_prefix("./") {
        p = stripped.to_string();
    }
    policy.apply(&p)
}

/// ASCII-only lowercasing. Avoids locale-dependent case mapping so the same
/// bytes always produce the same key on every machine.
fn lower_ascii(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}
