use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Poll until the file stops changing.
///
/// Succeeds when both size and mtime are unchanged across two consecutive
/// polls *and* the file can be opened for reading — the open catches
/// writers that still hold an exclusive lock (Live on Windows does). Gives
/// up after `attempts` polls.
pub fn wait_file_stable(path: &Path, interval: Duration, attempts: u32) -> bool {
    let mut last: Option<(u64, SystemTime)> = None;
    for _ in 0..attempts {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => {
                std::thread::sleep(interval);
                continue;
            }
        };
        let observed = (meta.len(), meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));
        if last == Some(observed) && File::open(path).is_ok() {
            return true;
        }
        last = Some(observed);
        std::thread::sleep(interval);
    }
    false
}
