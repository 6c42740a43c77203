//! Per-MIDI-clip note fingerprints.
//!
//! Each `<MidiClip>` subtree carries a `<Notes>` block describing its MIDI
//! content. The block is re-encoded into a canonical byte stream and hashed,
//! so reordered attributes elsewhere in the file or cosmetic churn outside
//! `<Notes>` never changes a clip's fingerprint.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use sha2::{Digest, Sha256};

/// Extract `clip name → hex SHA-256(notes subtree)` from session XML.
///
/// The clip name is the first `Name`/`Annotation` `Value` attribute inside
/// the clip; unnamed clips get synthetic `clip-<n>` names in document order.
/// Never fails: malformed XML yields the clips hashed so far.
pub fn midi_note_hashes(xml: &[u8]) -> BTreeMap<String, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().check_end_names = false;

    let mut out = BTreeMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref start)) if start.local_name().as_ref() == b"MidiClip" => {
                let Some((name, hash)) = hash_clip(&mut reader) else {
                    break;
                };
                let name = name.unwrap_or_else(|| format!("clip-{}", out.len() + 1));
                out.insert(name, hash);
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    out
}

/// Walk one `<MidiClip>` subtree: collect its name and hash its `<Notes>`.
///
/// Returns `None` only when the parser dies mid-subtree (truncated file).
fn hash_clip(reader: &mut Reader<&[u8]>) -> Option<(Option<String>, String)> {
    let mut name: Option<String> = None;
    let mut digest = Sha256::new();
    let mut depth = 1u32;

    while depth > 0 {
        let event = reader.read_event().ok()?;
        match event {
            Event::Start(ref start) => {
                depth += 1;
                match start.local_name().as_ref() {
                    b"Name" | b"Annotation" => {
                        if name.is_none() {
                            name = value_attr(start);
                        }
                    }
                    b"Notes" => {
                        let bytes = encode_subtree(reader, start.clone().into_owned())?;
                        digest.update(&bytes);
                        // encode_subtree consumed the matching </Notes>.
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            Event::Empty(ref start) => match start.local_name().as_ref() {
                b"Name" | b"Annotation" => {
                    if name.is_none() {
                        name = value_attr(start);
                    }
                }
                b"Notes" => {
                    let mut writer = Writer::new(Vec::new());
                    let _ = writer.write_event(Event::Empty(start.clone()));
                    digest.update(writer.into_inner());
                }
                _ => {}
            },
            Event::End(_) => depth -= 1,
            Event::Eof => return None,
            _ => {}
        }
    }

    Some((name, hex::encode(digest.finalize())))
}

/// Re-encode the subtree rooted at an already-read start tag (inclusive)
/// into canonical bytes.
fn encode_subtree(
    reader: &mut Reader<&[u8]>,
    root: quick_xml::events::BytesStart<'static>,
) -> Option<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let _ = writer.write_event(Event::Start(root));
    let mut depth = 1u32;

    while depth > 0 {
        let event = reader.read_event().ok()?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return None,
            _ => {}
        }
        match event {
            Event::Start(_) | Event::End(_) | Event::Empty(_) | Event::Text(_) => {
                let _ = writer.write_event(event);
            }
            _ => {}
        }
    }
    Some(writer.into_inner())
}

fn value_attr(start: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    start
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"Value")
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}
