//! File watcher for the documents folder. Reports debounced changes so the caller can
//! request a rebuild.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{self, RecommendedWatcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tracing::{debug, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Keeps the watch alive; dropping it stops watching.
pub struct FolderWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

/// Watches `root` recursively and calls `on_change` with the changed paths after each
/// debounced burst. Paths inside an ignored directory (e.g. the index directory when it
/// sits under `root`) don't count; a burst made only of those is dropped.
pub fn watch_folder(
    root: &Path,
    ignore_dirs: &[String],
    debounce: Duration,
    on_change: impl Fn(Vec<PathBuf>) + Send + 'static,
) -> Result<FolderWatcher, WatchError> {
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }
    let root = root.canonicalize().map_err(WatchError::Canonicalize)?;
    let ignore_dirs = ignore_dirs.to_vec();
    let callback_root = root.clone();

    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let changed: Vec<PathBuf> = events
                .into_iter()
                .map(|e| e.path)
                .filter(|p| !is_ignored(&callback_root, p, &ignore_dirs))
                .collect();
            if changed.is_empty() {
                debug!("ignoring changes inside ignored directories");
                return;
            }
            on_change(changed);
        }
        Err(e) => warn!(error = %e, "watcher error"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, notify::RecursiveMode::Recursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;

    Ok(FolderWatcher {
        _debouncer: debouncer,
    })
}

fn is_ignored(root: &Path, path: &Path, ignore_dirs: &[String]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| ignore_dirs.iter().any(|d| d == name))
            .unwrap_or(false)
    })
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}
