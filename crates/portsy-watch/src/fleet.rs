use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use portsy_scan::scan_projects;

use crate::error::WatchResult;
use crate::project::{watch_project, SaveCallback, WatcherConfig};

/// Watch every project folder under `root`, starting and stopping
/// per-project watchers as folders come and go.
///
/// Initial scan starts a watcher per existing project; afterwards any
/// create/rename at the root (or a top-level `.als` change one level down)
/// schedules a debounced rescan that picks up newly-qualifying folders.
/// Cancelling `cancel` stops the fleet and every child watcher.
pub async fn watch_fleet(
    root: PathBuf,
    config: WatcherConfig,
    cancel: CancellationToken,
    on_save: SaveCallback,
) -> WatchResult<()> {
    let fleet = FleetState {
        root: root.clone(),
        config: config.clone(),
        cancel: cancel.clone(),
        on_save,
        children: HashMap::new(),
        runtime: tokio::runtime::Handle::current(),
    };
    tokio::task::spawn_blocking(move || fleet.run())
        .await
        .map_err(|e| crate::error::WatchError::Io(std::io::Error::other(e.to_string())))?
}

struct FleetState {
    root: PathBuf,
    config: WatcherConfig,
    cancel: CancellationToken,
    on_save: SaveCallback,
    /// Live child watchers by project path.
    children: HashMap<PathBuf, CancellationToken>,
    /// Handle back into the async runtime; the fleet loop itself runs on a
    /// blocking thread.
    runtime: tokio::runtime::Handle,
}

impl FleetState {
    fn run(mut self) -> WatchResult<()> {
        let (tx, rx) = std_mpsc::channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.root, RecursiveMode::NonRecursive)?;
        info!(root = %self.root.display(), "fleet watcher running");

        self.start_missing_watchers();

        let mut rescan_at: Option<Instant> = None;
        loop {
            if self.cancel.is_cancelled() {
                // Children hang off child tokens of `cancel`; they are
                // already stopping.
                debug!("fleet watcher cancelled");
                return Ok(());
            }

            let timeout = match rescan_at {
                Some(d) => d.saturating_duration_since(Instant::now()).min(Duration::from_millis(100)),
                None => Duration::from_millis(100),
            };
            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    if wants_rescan(&event, &self.root) {
                        debug!(kind = ?event.kind, "root change; scheduling rescan");
                        rescan_at = Some(Instant::now() + self.config.rescan_debounce);
                    }
                }
                Ok(Err(err)) => warn!(error = %err, "fleet watch error"),
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("fleet watch channel closed");
                    return Ok(());
                }
            }

            if let Some(d) = rescan_at {
                if Instant::now() >= d {
                    rescan_at = None;
                    self.start_missing_watchers();
                }
            }
        }
    }

    /// Start a per-project watcher for every qualifying folder that does
    /// not have a live one yet.
    fn start_missing_watchers(&mut self) {
        let projects = match scan_projects(&self.root) {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "project rescan failed");
                return;
            }
        };
        // Forget children whose token already died (project vanished and
        // its watcher returned).
        self.children.retain(|_, token| !token.is_cancelled());

        for project in projects {
            let path = PathBuf::from(&project.path);
            if self.children.contains_key(&path) {
                continue;
            }
            let token = self.cancel.child_token();
            self.children.insert(path.clone(), token.clone());
            info!(project = %project.name, "starting project watcher");

            let config = self.config.clone();
            let on_save = self.on_save.clone();
            let name = project.name.clone();
            let child_token = token.clone();
            self.runtime.spawn(async move {
                if let Err(err) =
                    watch_project(name.clone(), path, config, child_token.clone(), on_save).await
                {
                    warn!(project = %name, error = %err, "project watcher exited");
                }
                // Mark the slot dead so a rescan can restart the project.
                child_token.cancel();
            });
        }
    }
}

/// Root events that should trigger a rescan: a new/renamed entry directly
/// under the root, or a top-level `.als` appearing one level down.
fn wants_rescan(event: &notify::Event, root: &Path) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {}
        _ => return false,
    }
    event.paths.iter().any(|p| {
        if p.extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case("als"))
            .unwrap_or(false)
        {
            // <root>/<project>/<file>.als
            return p
                .parent()
                .and_then(Path::parent)
                .map(|grand| grand == root)
                .unwrap_or(false);
        }
        p.parent() == Some(root)
    })
}
