use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};

use super::ReloadQueue;

/// Queues reload requests for files created or modified below a directory.
///
/// Events arrive on the watcher's background thread
/// and are applied at the start of the next [`Engine::tick`](crate::Engine::tick).
/// Dropping the watcher stops watching.
pub struct Watcher {
    root:     PathBuf,
    _watcher: RecommendedWatcher,
}

impl Watcher {
    /// Watches `root` recursively.
    /// Paths are queued relative to `root`, matching the paths passed to
    /// [`DirFetch`](crate::resource::DirFetch) with the same root.
    pub fn new(root: impl Into<PathBuf>, queue: Arc<ReloadQueue>) -> notify::Result<Self> {
        let root = root.into();
        let base = root.canonicalize().unwrap_or_else(|_| root.clone());

        let event_base = base.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            match event {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    for path in &event.paths {
                        match relative_path(&event_base, path) {
                            Some(relative) => {
                                queue.request_path(&relative);
                            }
                            None => log::trace!("Ignored change outside root: {}", path.display()),
                        }
                    }
                }
                Err(err) => log::warn!("File watcher error: {err}"),
            }
        })?;
        watcher.watch(&base, RecursiveMode::Recursive)?;

        log::info!("Watching {} for resource changes", base.display());
        Ok(Self { root, _watcher: watcher })
    }

    /// The watched directory.
    pub fn root(&self) -> &Path { &self.root }
}

fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let relative = canonical.strip_prefix(base).ok()?;
    let parts: Vec<_> =
        relative.components().map(|part| part.as_os_str().to_string_lossy().into_owned()).collect();
    Some(parts.join("/"))
}
