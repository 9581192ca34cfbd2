//! Watch mode: re-run the sync cycle whenever the document or any file it
//! includes changes.
//!
//! Filesystem events arrive on a notify thread and are forwarded over a
//! channel. The loop debounces bursts, then runs one cycle on the blocking
//! pool and waits for it, so cycles never overlap; events that arrive while a
//! cycle runs are picked up by the next one.

use crate::markdown::collect_reachable_files;
use crate::sync::Syncer;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Files reachable from the root document and the directories holding them.
#[derive(Debug)]
pub struct WatchSet {
    root: PathBuf,
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
}

/// Directories to start and stop watching after a refresh.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DirChanges {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl WatchSet {
    pub fn new(root: &Path) -> Self {
        Self {
            root: canonical(root),
            files: HashSet::new(),
            dirs: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(&canonical(path))
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    /// Replace the file set; the root document is always kept.
    pub fn update(&mut self, files: Vec<PathBuf>) -> DirChanges {
        let mut next: HashSet<PathBuf> = files.iter().map(|f| canonical(f)).collect();
        next.insert(self.root.clone());

        let added_files: Vec<_> = next.difference(&self.files).cloned().collect();
        if !added_files.is_empty() && !self.files.is_empty() {
            for file in &added_files {
                log::info!("[WATCH] Now watching {}", file.display());
            }
        }

        let next_dirs: HashSet<PathBuf> = next
            .iter()
            .filter_map(|f| f.parent().map(Path::to_path_buf))
            .collect();

        let mut changes = DirChanges {
            added: next_dirs.difference(&self.dirs).cloned().collect(),
            removed: self.dirs.difference(&next_dirs).cloned().collect(),
        };
        changes.added.sort();
        changes.removed.sort();

        self.files = next;
        self.dirs = next_dirs;
        changes
    }

    /// Re-walk the inclusion graph and adjust the watcher to match.
    pub fn refresh<W: Watcher>(&mut self, watcher: &mut W) {
        let files = collect_reachable_files(&self.root);
        let changes = self.update(files);

        for dir in &changes.removed {
            if let Err(e) = watcher.unwatch(dir) {
                log::debug!("[WATCH] Failed to unwatch {}: {}", dir.display(), e);
            }
        }
        for dir in &changes.added {
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => log::info!("[WATCH] Watching directory {}", dir.display()),
                Err(e) => log::warn!("[WATCH] Failed to watch {}: {}", dir.display(), e),
            }
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Whether a notify event can mean file contents changed.
fn is_content_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Run the initial sync, then watch until Ctrl+C.
pub async fn run_watch(syncer: Arc<Syncer>, debounce: Duration) -> Result<(), String> {
    log::info!("[WATCH] Running initial sync");
    run_cycle(&syncer).await;

    let (tx, mut rx) = mpsc::channel::<PathBuf>(EVENT_CHANNEL_CAPACITY);

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_content_event(&event) {
                    return;
                }
                for path in event.paths {
                    // a full channel already guarantees a pending cycle
                    let _ = tx.try_send(path);
                }
            }
            Err(e) => log::error!("[WATCH] Watch error: {:?}", e),
        })
        .map_err(|e| format!("Failed to create file watcher: {}", e))?;

    let mut watch_set = WatchSet::new(syncer.markdown_path());
    watch_set.refresh(&mut watcher);
    log::info!(
        "[WATCH] Watching {} and its included files (Ctrl+C to stop)",
        watch_set.root().display()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("[WATCH] Interrupted, stopping");
                break;
            }
            event = rx.recv() => {
                let Some(path) = event else {
                    log::warn!("[WATCH] Event channel closed, stopping");
                    break;
                };
                if !watch_set.contains(&path) {
                    continue;
                }

                log::info!("[WATCH] Change detected: {}", path.display());

                // coalesce the rest of the burst
                let window = tokio::time::sleep(debounce);
                tokio::pin!(window);
                loop {
                    tokio::select! {
                        _ = &mut window => break,
                        more = rx.recv() => if more.is_none() { break },
                    }
                }

                // any document may have gained or lost an inclusion
                watch_set.refresh(&mut watcher);
                run_cycle(&syncer).await;
            }
        }
    }

    Ok(())
}

async fn run_cycle(syncer: &Arc<Syncer>) {
    let syncer = Arc::clone(syncer);
    match tokio::task::spawn_blocking(move || syncer.run_once()).await {
        Ok(Ok(_summary)) => {}
        Ok(Err(e)) => log::error!("[WATCH] Sync failed: {}", e),
        Err(e) => log::error!("[WATCH] Sync task panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_update_tracks_directories_of_included_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("main.md"), "[[sub/a.md]]").unwrap();
        std::fs::write(dir.path().join("sub/a.md"), "ls").unwrap();

        let root = dir.path().join("main.md");
        let mut set = WatchSet::new(&root);
        let changes = set.update(collect_reachable_files(&root));

        let base = dir.path().canonicalize().unwrap();
        assert_eq!(changes.added, vec![base.clone(), base.join("sub")]);
        assert!(changes.removed.is_empty());
        assert!(set.contains(&dir.path().join("sub/a.md")));
        assert!(!set.contains(&dir.path().join("sub/other.md")));

        // inclusion removed from the document: sub/ is no longer needed
        std::fs::write(dir.path().join("main.md"), "ls").unwrap();
        let changes = set.update(collect_reachable_files(&root));
        assert!(changes.added.is_empty());
        assert_eq!(changes.removed, vec![base.join("sub")]);
        assert!(!set.contains(&dir.path().join("sub/a.md")));
    }

    #[test]
    fn test_root_is_always_watched() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("missing.md");
        let mut set = WatchSet::new(&root);
        set.update(Vec::new());
        assert!(set.contains(&root));
        assert_eq!(set.files().count(), 1);
    }

    #[test]
    fn test_only_content_events_trigger() {
        let modify = Event::new(EventKind::Modify(notify::event::ModifyKind::Any));
        let create = Event::new(EventKind::Create(notify::event::CreateKind::File));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any));
        assert!(is_content_event(&modify));
        assert!(is_content_event(&create));
        assert!(!is_content_event(&access));
    }
}
