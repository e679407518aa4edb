//! Filesystem watcher feeding [`crate::unit_repo::StoreUnitRepo::on_fs_event`]:
//! a `notify::RecommendedWatcher` on one thread, debounced on another, with
//! ready batches handed to the caller on demand rather than pushed via a
//! callback — the facade stays synchronous, so the watcher just accumulates.

use super::debouncer::Debouncer;
use super::path_registry::PathRegistry;
use crate::error::WatchError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Mutex;

/// Owns the `notify` watcher and a debounce buffer. Directories are added
/// lazily as unit file-dependencies become known; `take_ready_paths` is
/// polled by the caller (the CLI `watch` loop, or a background thread) to
/// drain paths that have been stable for the debounce window.
pub struct FsWatcher {
    watcher: Mutex<RecommendedWatcher>,
    registry: Mutex<PathRegistry>,
    debouncer: Mutex<Debouncer>,
    events: Receiver<notify::Result<Event>>,
}

impl FsWatcher {
    pub fn new(debounce_ms: u64) -> Result<Self, WatchError> {
        let (tx, events): (Sender<notify::Result<Event>>, Receiver<notify::Result<Event>>) = channel();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            registry: Mutex::new(PathRegistry::new()),
            debouncer: Mutex::new(Debouncer::new(debounce_ms)),
            events,
        })
    }

    /// Registers `paths` for watching, adding `notify` watches on any newly
    /// seen parent directories.
    pub fn track_paths(&self, paths: impl IntoIterator<Item = PathBuf>) -> Result<(), WatchError> {
        let new_dirs = self.registry.lock().expect("path registry lock poisoned").add_paths(paths);
        let mut watcher = self.watcher.lock().expect("watcher lock poisoned");
        for dir in new_dirs {
            if !dir.exists() {
                return Err(WatchError::MissingPath(dir));
            }
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        }
        Ok(())
    }

    pub fn untrack_path(&self, path: &Path) {
        self.registry.lock().expect("path registry lock poisoned").remove_path(path);
    }

    /// Drains pending `notify` events into the debouncer without blocking,
    /// then returns every path that has been stable for the debounce
    /// window. Call periodically from the `watch` loop.
    pub fn take_ready_paths(&self) -> Vec<PathBuf> {
        let mut debouncer = self.debouncer.lock().expect("debouncer lock poisoned");
        while let Ok(result) = self.events.try_recv() {
            let Ok(event) = result else { continue };
            match event.kind {
                EventKind::Remove(_) => {
                    for path in &event.paths {
                        debouncer.remove(path);
                    }
                }
                _ => {
                    for path in event.paths {
                        debouncer.record(path);
                    }
                }
            }
        }
        debouncer.take_ready()
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.lock().expect("debouncer lock poisoned").has_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn tracks_a_directory_and_reports_a_write_once_debounced() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.c");
        fs::write(&file, "int main() {}").unwrap();

        let watcher = FsWatcher::new(30).unwrap();
        watcher.track_paths(vec![file.clone()]).unwrap();

        fs::write(&file, "int main() { return 1; }").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let ready = watcher.take_ready_paths();
        assert!(ready.iter().any(|p| p.file_name() == file.file_name()));
    }
}
