//! Per-directory change watches.
//!
//! One debounced, non-recursive watch per loaded directory. Events are
//! classified as created/deleted by probing the path, then forwarded over
//! the store's watch channel; the watch stops when the guard is dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use tokio::sync::mpsc;

use crate::fs::{WatchEvent, WatchGuard, WatchKind};

/// Whether `path` is a direct child of `dir`.
pub(crate) fn is_direct_child(dir: &Path, path: &Path) -> bool {
    path.parent() == Some(dir)
}

/// Watches a single directory for created/deleted direct children.
pub struct DirWatcher {
    /// Dropped to stop watching.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl DirWatcher {
    pub fn new(
        dir: &Path,
        debounce: Duration,
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> notify::Result<Self> {
        let dir_path = dir.to_path_buf();

        let mut debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match result {
                    Ok(events) => events,
                    // Watcher errors are non-fatal; silently ignore.
                    Err(_) => return,
                };
                for event in events {
                    if event.kind != DebouncedEventKind::Any {
                        continue;
                    }
                    let path: PathBuf = event.path;
                    if !is_direct_child(&dir_path, &path) {
                        continue;
                    }
                    let kind = if path.exists() {
                        WatchKind::Created
                    } else {
                        WatchKind::Deleted
                    };
                    let _ = tx.send(WatchEvent {
                        dir: dir_path.clone(),
                        path,
                        kind,
                    });
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(dir, notify::RecursiveMode::NonRecursive)?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

impl fmt::Debug for DirWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirWatcher").finish()
    }
}

impl WatchGuard for DirWatcher {}
