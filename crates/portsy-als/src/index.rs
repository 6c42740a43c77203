use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clips::midi_note_hashes;
use crate::samples::{extract_sample_refs, normalize_sample_paths};

/// The logical content of one session revision.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    /// Deduplicated, sorted sample references; project-relative where the
    /// file lives inside the project, absolute otherwise.
    pub sample_paths: Vec<String>,
    /// `clip name → hex digest of the clip's Notes subtree`.
    pub clip_hashes: BTreeMap<String, String>,
}

impl SessionIndex {
    pub fn is_empty(&self) -> bool {
        self.sample_paths.is_empty() && self.clip_hashes.is_empty()
    }
}

/// Build a [`SessionIndex`] from decompressed session XML.
///
/// Empty input yields an empty index; malformed XML yields whatever could
/// be parsed. This function never fails.
pub fn build_index(xml: &[u8], project_root: &Path) -> SessionIndex {
    if xml.is_empty() {
        return SessionIndex::default();
    }
    SessionIndex {
        sample_paths: normalize_sample_paths(extract_sample_refs(xml), project_root),
        clip_hashes: midi_note_hashes(xml),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &[u8] = br#"
        <Ableton>
          <Tracks>
            <MidiClip>
              <Name Value="Lead"/>
              <Notes><Note Time="0" Vel="100"/></Notes>
            </MidiClip>
            <AudioClip>
              <FileRef>
                <RelativePath Value="Samples/Imported"/>
                <FileName Value="kick.wav"/>
              </FileRef>
            </AudioClip>
            <SampleRef>
              <FileRef>
                <AbsolutePath Value="/proj/Samples/loop.aif"/>
              </FileRef>
            </SampleRef>
          </Tracks>
        </Ableton>"#;

    #[test]
    fn index_collects_samples_and_clips() {
        let idx = build_index(SESSION, Path::new("/proj"));
        assert_eq!(
            idx.sample_paths,
            vec![
                "Samples/Imported/kick.wav".to_string(),
                "Samples/loop.aif".to_string(),
            ]
        );
        assert_eq!(idx.clip_hashes.len(), 1);
        assert!(idx.clip_hashes.contains_key("Lead"));
    }

    #[test]
    fn empty_input_is_empty_index() {
        let idx = build_index(b"", Path::new("/proj"));
        assert!(idx.is_empty());
    }

    #[test]
    fn index_is_deterministic() {
        let a = build_index(SESSION, Path::new("/proj"));
        let b = build_index(SESSION, Path::new("/proj"));
        assert_eq!(a, b);
    }

    #[test]
    fn serde_roundtrip() {
        let idx = build_index(SESSION, Path::new("/proj"));
        let json = serde_json::to_string(&idx).unwrap();
        let back: SessionIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, idx);
    }
}
