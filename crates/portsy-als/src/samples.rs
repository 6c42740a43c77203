//! Sample-reference extraction from session XML.
//!
//! Live embeds audio references in several shapes depending on version and
//! provenance. The extractor walks the XML events once and recognizes:
//!
//! 1. `file://` (optionally `file://localhost/`) URIs, percent-decoded
//! 2. absolute Windows paths (`C:\…`)
//! 3. relative `Samples/…` paths
//! 4. `<FileRef>` blocks carrying `AbsolutePath` | `Url` |
//!    (`RelativePath`/`Path` + `FileName`) child elements
//!
//! All attribute values are inspected, so shapes 1–3 are found wherever they
//! appear, inside or outside a `FileRef`.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Audio file extensions recognized as sample references.
pub const AUDIO_EXTS: &[&str] = &["wav", "aif", "aiff", "flac", "mp3", "ogg"];

/// Does the path end in a recognized audio extension (case-insensitive)?
pub fn has_audio_ext(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    AUDIO_EXTS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Accumulator for the path-bearing children of one `<FileRef>` block.
#[derive(Default)]
struct FileRefBlock {
    absolute: Option<String>,
    url: Option<String>,
    relative: Option<String>,
    file_name: Option<String>,
}

impl FileRefBlock {
    /// Resolve the block to a path, mirroring the precedence Live readers
    /// use in practice: absolute path, then URL, then relative + filename.
    fn resolve(self) -> Vec<String> {
        if let Some(abs) = self.absolute.filter(|p| has_audio_ext(p)) {
            return vec![abs];
        }
        if let Some(url) = self.url {
            if let Some(decoded) = decode_file_url(&url) {
                return vec![decoded];
            }
        }
        match (self.relative, self.file_name) {
            (Some(rel), Some(name)) if has_audio_ext(&name) => {
                let sep = if rel.ends_with('/') || rel.ends_with('\\') {
                    ""
                } else {
                    "/"
                };
                vec![format!("{rel}{sep}{name}")]
            }
            (None, Some(name)) if has_audio_ext(&name) => vec![name],
            (Some(rel), _) if has_audio_ext(&rel) => vec![rel],
            _ => Vec::new(),
        }
    }
}

/// Decode a `file://` URL into a filesystem path.
pub fn decode_file_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("file://")?;
    let rest = rest.strip_prefix("localhost/").unwrap_or(rest);
    let decoded = percent_decode(rest);
    has_audio_ext(&decoded).then_some(decoded)
}

/// Minimal percent-decoding (`%2F` → `/`). Invalid escapes pass through
/// unchanged; sample paths are not expected to be adversarial.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Does the string look like an absolute Windows path (`C:\…` or `C:/…`)?
pub fn is_windows_abs(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Trim quotes/whitespace and normalize separators on a raw candidate.
fn clean_candidate(raw: &str) -> String {
    let mut p = raw.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
    p = p.replace('\\', "/");
    if let Some(stripped) = p.strip_prefix("./") {
        p = stripped.to_string();
    }
    p
}

/// Classify one attribute value against shapes 1–3.
fn loose_candidate(value: &str) -> Option<String> {
    let v = value.trim();
    if v.starts_with("file://") {
        return decode_file_url(v);
    }
    if is_windows_abs(v) && has_audio_ext(v) {
        return Some(v.to_string());
    }
    let rel = v.strip_prefix("./").unwrap_or(v);
    if (rel.starts_with("Samples/") || rel.starts_with("Samples\\")) && has_audio_ext(rel) {
        return Some(rel.to_string());
    }
    None
}

fn attr_value(start: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in start.attributes().with_checks(false).flatten() {
        if attr.key.local_name().as_ref() == key {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Extract raw (un-relativized) sample references from session XML.
///
/// Never fails: malformed XML yields whatever was gathered before the
/// parser gave up.
pub fn extract_sample_refs(xml: &[u8]) -> Vec<String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().check_end_names = false;

    let mut found: Vec<String> = Vec::new();
    let mut blocks: Vec<FileRefBlock> = Vec::new();

    // The loose attribute scan and the FileRef resolution can surface the
    // same reference; keep first-seen order without duplicates.
    let push = |p: String, found: &mut Vec<String>| {
        let cleaned = clean_candidate(&p);
        if !cleaned.is_empty() && !found.contains(&cleaned) {
            found.push(cleaned);
        }
    };

    loop {
        let event = match reader.read_event() {
            Ok(e) => e,
            Err(_) => break,
        };
        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                let name = start.local_name().as_ref().to_vec();
                let value = attr_value(start, b"Value");

                // Shapes 1–3: any attribute value that looks like audio.
                for attr in start.attributes().with_checks(false).flatten() {
                    let raw = String::from_utf8_lossy(&attr.value);
                    if let Some(p) = loose_candidate(&raw) {
                        push(p, &mut found);
                    }
                }

                if name == b"FileRef" || name == b"SampleRef" {
                    if matches!(event, Event::Start(_)) {
                        blocks.push(FileRefBlock::default());
                    }
                    continue;
                }

                // Shape 4: path-bearing children of the innermost FileRef.
                if let (Some(block), Some(value)) = (blocks.last_mut(), value) {
                    match name.as_slice() {
                        b"AbsolutePath" => block.absolute.get_or_insert(value),
                        b"Url" => block.url.get_or_insert(value),
                        b"RelativePath" | b"Path" => block.relative.get_or_insert(value),
                        b"FileName" | b"Name" => block.file_name.get_or_insert(value),
                        _ => continue,
                    };
                }
            }
            Event::End(ref end) => {
                let name = end.local_name();
                if name.as_ref() == b"FileRef" || name.as_ref() == b"SampleRef" {
                    if let Some(block) = blocks.pop() {
                        for p in block.resolve() {
                            push(p, &mut found);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    found
}

/// Absolutize against the project root, then relativize the paths that live
/// inside the project. Deduplicated and sorted.
pub fn normalize_sample_paths(paths: Vec<String>, project_root: &Path) -> Vec<String> {
    let root = project_root.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');

    let mut out: Vec<String> = Vec::new();
    for p in paths {
        let p = p.trim();
        if p.is_empty() {
            continue;
        }
        let abs = if Path::new(p).is_absolute() || is_windows_abs(p) {
            p.to_string()
        } else {
            format!("{root}/{p}")
        };
        let abs = lexical_clean(&abs);

        // Containment requires a path-segment boundary; "/proj" must not
        // swallow "/project2/...".
        let rel = abs
            .strip_prefix(root)
            .and_then(|r| r.strip_prefix('/'))
            .map(str::to_string)
            .filter(|r| !r.starts_with(".."));
        let key = rel.unwrap_or(abs);
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out.sort();
    out
}

/// Lexically resolve `.` and `..` segments in a forward-slashed path.
fn lexical_clean(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_ext_check() {
        assert!(has_audio_ext("kick.wav"));
        assert!(has_audio_ext("KICK.WAV"));
        assert!(has_audio_ext("pad.aiff"));
        assert!(!has_audio_ext("set.als"));
        assert!(!has_audio_ext("waveform"));
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("My%20Kick.wav"), "My Kick.wav");
        assert_eq!(percent_decode("plain.wav"), "plain.wav");
        assert_eq!(percent_decode("bad%zz.wav"), "bad%zz.wav");
    }

    #[test]
    fn file_url_shapes() {
        assert_eq!(
            decode_file_url("file:///Users/a/My%20Kick.wav").as_deref(),
            Some("/Users/a/My Kick.wav")
        );
        assert_eq!(
            decode_file_url("file://localhost/C:/Audio/hit.wav").as_deref(),
            Some("C:/Audio/hit.wav")
        );
        assert!(decode_file_url("file:///Users/a/set.als").is_none());
        assert!(decode_file_url("https://example.com/x.wav").is_none());
    }

    #[test]
    fn extracts_file_uri_attributes() {
        let xml = br#"<A><B Value="file:///Users/a/Loops/break.wav"/></A>"#;
        let refs = extract_sample_refs(xml);
        assert_eq!(refs, vec!["/Users/a/Loops/break.wav"]);
    }

    #[test]
    fn extracts_windows_absolute_paths() {
        let xml = br#"<A><Data Value="C:\Audio\Drums\kick.wav"/></A>"#;
        let refs = extract_sample_refs(xml);
        assert_eq!(refs, vec!["C:/Audio/Drums/kick.wav"]);
    }

    #[test]
    fn extracts_relative_samples_paths() {
        let xml = br#"<A><P Value="Samples/Imported/snare.wav"/><Q Value="./Samples/hat.ogg"/></A>"#;
        let refs = extract_sample_refs(xml);
        assert!(refs.contains(&"Samples/Imported/snare.wav".to_string()));
        assert!(refs.contains(&"Samples/hat.ogg".to_string()));
    }

    #[test]
    fn extracts_fileref_relative_plus_filename() {
        let xml = br#"
            <Ableton>
              <FileRef>
                <RelativePath Value="Samples/Processed"/>
                <FileName Value="vocal.flac"/>
              </FileRef>
            </Ableton>"#;
        let refs = extract_sample_refs(xml);
        assert_eq!(refs, vec!["Samples/Processed/vocal.flac"]);
    }

    #[test]
    fn fileref_absolute_wins_over_relative() {
        let xml = br#"
            <FileRef>
              <AbsolutePath Value="/mnt/audio/perc.wav"/>
              <RelativePath Value="Samples"/>
              <FileName Value="perc.wav"/>
            </FileRef>"#;
        let refs = extract_sample_refs(xml);
        assert_eq!(refs, vec!["/mnt/audio/perc.wav"]);
    }

    #[test]
    fn fileref_url_decoded() {
        let xml = br#"
            <FileRef>
              <Url Value="file://localhost/D:/Field%20Recordings/rain.mp3"/>
            </FileRef>"#;
        let refs = extract_sample_refs(xml);
        assert_eq!(refs, vec!["D:/Field Recordings/rain.mp3"]);
    }

    #[test]
    fn malformed_xml_yields_partial_result() {
        let xml = b"<A><B Value=\"Samples/ok.wav\"/><C <<broken";
        let refs = extract_sample_refs(xml);
        assert!(refs.contains(&"Samples/ok.wav".to_string()));
    }

    #[test]
    fn non_audio_attributes_ignored() {
        let xml = br#"<A Value="Samples/readme.txt"/><B Value="14.5"/>"#;
        assert!(extract_sample_refs(xml).is_empty());
    }

    #[test]
    fn normalize_relativizes_inside_project() {
        let paths = vec![
            "/proj/Samples/kick.wav".to_string(),
            "Samples/snare.wav".to_string(),
            "/elsewhere/hat.wav".to_string(),
        ];
        let out = normalize_sample_paths(paths, Path::new("/proj"));
        assert_eq!(
            out,
            vec![
                "/elsewhere/hat.wav".to_string(),
                "Samples/kick.wav".to_string(),
                "Samples/snare.wav".to_string(),
            ]
        );
    }

    #[test]
    fn normalize_dedupes() {
        let paths = vec![
            "Samples/kick.wav".to_string(),
            "/proj/Samples/kick.wav".to_string(),
            "./Samples/kick.wav".to_string(),
        ];
        let out = normalize_sample_paths(paths, Path::new("/proj"));
        assert_eq!(out, vec!["Samples/kick.wav".to_string()]);
    }

    #[test]
    fn lexical_clean_resolves_dots() {
        assert_eq!(lexical_clean("/a/b/../c/./d.wav"), "/a/c/d.wav");
        assert_eq!(lexical_clean("a//b/c.wav"), "a/b/c.wav");
    }
}
