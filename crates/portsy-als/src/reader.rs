use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{AlsError, AlsResult};

/// Decompression safety cap. A session that inflates past this is either
/// corrupt or hostile (zip bomb); callers skip it rather than buffering it.
pub const MAX_DECOMPRESSED_BYTES: u64 = 50 << 20; // 50 MiB

/// `.als` extension check, case-insensitive.
pub fn is_als(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("als"))
        .unwrap_or(false)
}

/// Pick the main session file out of a set of manifest keys: a `.als`
/// directly under the project root (subfolders like `Backup/` excluded),
/// lexicographically first when several qualify.
pub fn top_level_als<'a>(paths: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut candidate: Option<&str> = None;
    for p in paths {
        if !p.to_ascii_lowercase().ends_with(".als") || p.contains('/') {
            continue;
        }
        if candidate.map(|c| p < c).unwrap_or(true) {
            candidate = Some(p);
        }
    }
    candidate.map(str::to_string)
}

/// Gunzip up to `cap` bytes from `reader`.
///
/// Returns `Ok(None)` when the stream inflates past the cap — the caller
/// decides whether that is an error ([`read_session_xml`]) or a silent skip
/// (the previous-revision side of a logical diff).
pub fn gunzip_capped<R: Read>(reader: R, cap: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut decoder = GzDecoder::new(reader).take(cap + 1);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() as u64 > cap {
        return Ok(None);
    }
    Ok(Some(out))
}

/// Read and decompress the session XML at `path`, enforcing the cap.
pub fn read_session_xml(path: &Path) -> AlsResult<Vec<u8>> {
    let file = File::open(path)?;
    match gunzip_capped(BufReader::new(file), MAX_DECOMPRESSED_BYTES)? {
        Some(xml) => Ok(xml),
        None => Err(AlsError::TooLarge {
            path: path.to_path_buf(),
            limit: MAX_DECOMPRESSED_BYTES,
        }),
    }
}

#[cfg(test)]
pub(crate) fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}
