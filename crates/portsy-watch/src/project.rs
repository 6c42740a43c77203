use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use portsy_scan::resolve_session_file;

use crate::error::{WatchError, WatchResult};
use crate::stability::wait_file_stable;

/// Tunables for the per-project watcher.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Quiet period after the last qualifying event before stability
    /// checking starts.
    pub debounce: Duration,
    /// Stability poll interval.
    pub stability_interval: Duration,
    /// Stability poll attempts before the burst is silently dropped.
    pub stability_attempts: u32,
    /// Debounce for fleet-level rescans.
    pub rescan_debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(750),
            stability_interval: Duration::from_millis(150),
            stability_attempts: 10,
            rescan_debounce: Duration::from_millis(300),
        }
    }
}

/// A debounced, stability-checked session-file save.
#[derive(Clone, Debug)]
pub struct SaveEvent {
    pub project_name: String,
    pub project_path: PathBuf,
    pub als_path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

/// Callback invoked synchronously for each save. Invocations for one
/// project are strictly serial.
pub type SaveCallback = Arc<dyn Fn(SaveEvent) + Send + Sync>;

/// Watch one project directory for saves of its top-level session file.
///
/// Runs until `cancel` fires. The watcher thread owns the OS watch handle
/// and releases it on return. Transient watch errors are logged and the
/// loop keeps going.
pub async fn watch_project(
    project_name: String,
    project_path: PathBuf,
    config: WatcherConfig,
    cancel: CancellationToken,
    on_save: SaveCallback,
) -> WatchResult<()> {
    let als_path = resolve_session_file(&project_path)
        .ok_or_else(|| WatchError::NoSessionFile(project_path.clone()))?;

    tokio::task::spawn_blocking(move || {
        watch_project_blocking(project_name, project_path, als_path, config, cancel, on_save)
    })
    .await
    .map_err(|e| WatchError::Io(std::io::Error::other(e.to_string())))?
}

/// The blocking event loop: notify events in, debounced stable saves out.
fn watch_project_blocking(
    project_name: String,
    project_path: PathBuf,
    mut als_path: PathBuf,
    config: WatcherConfig,
    cancel: CancellationToken,
    on_save: SaveCallback,
) -> WatchResult<()> {
    let (tx, rx) = std_mpsc::channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&project_path, RecursiveMode::NonRecursive)?;
    info!(project = %project_name, als = %als_path.display(), "watching project");

    // Debounce state: the deadline is pushed out on every qualifying event.
    let mut deadline: Option<Instant> = None;

    loop {
        if cancel.is_cancelled() {
            debug!(project = %project_name, "watcher cancelled");
            return Ok(());
        }

        // Sleep until the debounce deadline or in short slices while idle,
        // so cancellation is honored promptly.
        let timeout = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()).min(Duration::from_millis(100)),
            None => Duration::from_millis(100),
        };

        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                if qualifies(&event, &project_path, &als_path) {
                    debug!(project = %project_name, kind = ?event.kind, "qualifying event; debouncing");
                    deadline = Some(Instant::now() + config.debounce);
                }
            }
            Ok(Err(err)) => {
                warn!(project = %project_name, error = %err, "watch error");
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                warn!(project = %project_name, "watch channel closed");
                return Ok(());
            }
        }

        let Some(d) = deadline else { continue };
        if Instant::now() < d {
            continue;
        }
        deadline = None;

        // The tracked file may have been replaced under a different name
        // between events.
        if !als_path.is_file() {
            match resolve_session_file(&project_path) {
                Some(new_path) => {
                    info!(project = %project_name, als = %new_path.display(), "session file re-resolved");
                    als_path = new_path;
                }
                None => {
                    warn!(project = %project_name, "session file disappeared; dropping burst");
                    continue;
                }
            }
        }

        if wait_file_stable(&als_path, config.stability_interval, config.stability_attempts) {
            let event = SaveEvent {
                project_name: project_name.clone(),
                project_path: project_path.clone(),
                als_path: als_path.clone(),
                detected_at: Utc::now(),
            };
            debug!(project = %project_name, "stable save detected");
            on_save(event);
        } else {
            debug!(project = %project_name, "file never stabilized; dropping burst");
        }
    }
}

/// Does this filesystem event concern the tracked session file?
///
/// Accepts write/create/rename/metadata kinds on a path whose parent is the
/// project root and whose basename matches the tracked file (directly, or
/// by name after an atomic-replace).
fn qualifies(event: &notify::Event, project_root: &Path, als_path: &Path) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {}
        _ => return false,
    }
    let als_base = als_path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    event.paths.iter().any(|p| {
        if p == als_path {
            return true;
        }
        let parent_matches = p.parent() == Some(project_root);
        let base = p
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        parent_matches && base.ends_with(".als") && base == als_base
    })
}
