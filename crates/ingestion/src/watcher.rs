//! Filesystem watch source for a directory tree of netCDF files.
//!
//! Raw `notify` events are translated into [`WatcherEvent`]s and pushed onto
//! a tokio channel. Hidden files and directories (any dot-prefixed component
//! below the root) are never reported; that also hides in-progress saves.
//!
//! The OS reports a directory move or copy as one event on the directory, so
//! directory events are expanded into events on the files inside.

use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use catalog_common::{CatalogError, CatalogResult, WatchOp, WatcherEvent, RENAME_SEPARATOR};

use crate::sync::CatalogSynchronizer;

/// Keeps the OS watch alive; dropping it stops event delivery.
pub struct DirectoryWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Watch `root` recursively. The root is canonicalized, so callers should
    /// build their mirrored file service from [`Self::root`].
    pub fn start(root: &Path, buffer: usize) -> CatalogResult<(Self, mpsc::Receiver<WatcherEvent>)> {
        let root = root.canonicalize().map_err(|e| {
            CatalogError::Watch(format!("cannot watch {}: {}", root.display(), e))
        })?;
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let callback_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for translated in translate(&callback_root, &event) {
                        for expanded in expand_directories(translated) {
                            // Runs on the notify thread, outside the runtime.
                            if tx.blocking_send(expanded).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Watch error"),
            }
        })
        .map_err(|e| CatalogError::Watch(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| CatalogError::Watch(e.to_string()))?;

        info!(root = %root.display(), "Watching directory");
        Ok((
            Self {
                root,
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translate one `notify` event.
///
/// - create: `Create`
/// - remove: `Remove`
/// - rename with both ends: `Rename`, or `Create`/`Remove` when one end is hidden
/// - rename-from: `Remove`; rename-to: `Create`
/// - close after write: re-sync (`Rename(p -> p)`)
pub fn translate(root: &Path, event: &Event) -> Vec<WatcherEvent> {
    let visible = |p: &PathBuf| !is_hidden(root, p);
    let text = |p: &PathBuf| p.to_string_lossy().into_owned();

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| visible(p))
            .map(|p| WatcherEvent::create(text(p)))
            .collect(),

        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| visible(p))
            .map(|p| WatcherEvent::remove(text(p)))
            .collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => match (visible(from), visible(to)) {
                (true, true) => vec![WatcherEvent::rename(&text(from), &text(to))],
                (false, true) => vec![WatcherEvent::create(text(to))],
                (true, false) => vec![WatcherEvent::remove(text(from))],
                (false, false) => Vec::new(),
            },
            _ => Vec::new(),
        },

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .filter(|p| visible(p))
            .map(|p| WatcherEvent::remove(text(p)))
            .collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .filter(|p| visible(p))
            .map(|p| WatcherEvent::create(text(p)))
            .collect(),

        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event
            .paths
            .iter()
            .filter(|p| visible(p))
            .map(|p| WatcherEvent::resync(&text(p)))
            .collect(),

        _ => Vec::new(),
    }
}

/// True if any component below `root` starts with a dot.
pub fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Replace an event whose target is a directory with events on its files.
///
/// A directory that appears is walked like a rewatch. A directory renamed
/// within the tree is a removal of the old subtree plus the walk. Removals
/// pass through, since the synchronizer drops everything below a removed path.
pub fn expand_directories(event: WatcherEvent) -> Vec<WatcherEvent> {
    match event.op {
        WatchOp::Remove => vec![event],
        WatchOp::Create => {
            let path = PathBuf::from(&event.full_path);
            if path.is_dir() {
                rewatch_events(&path)
            } else {
                vec![event]
            }
        }
        WatchOp::Rename => {
            let Some((old, new)) = event.full_path.split_once(RENAME_SEPARATOR) else {
                return vec![event];
            };
            let new = PathBuf::from(new);
            if !new.is_dir() {
                return vec![event];
            }
            let mut expanded = vec![WatcherEvent::remove(old)];
            expanded.extend(rewatch_events(&new));
            expanded
        }
    }
}

/// A re-sync event for every visible file under `root`, in a stable order.
pub fn rewatch_events(root: &Path) -> Vec<WatcherEvent> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(root, entry.path()))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during rewatch");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| WatcherEvent::resync(&entry.path().to_string_lossy()))
        .collect()
}

/// Feed watcher events to the synchronizer until shutdown or the watcher goes away.
///
/// With `rewatch`, every existing file is re-synchronized first.
pub fn spawn_sync_loop(
    root: PathBuf,
    mut events: mpsc::Receiver<WatcherEvent>,
    sync: CatalogSynchronizer,
    rewatch: bool,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if rewatch {
            let walk_root = root.clone();
            let initial = tokio::task::spawn_blocking(move || rewatch_events(&walk_root))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Rewatch walk failed");
                    Vec::new()
                });
            info!(root = %root.display(), files = initial.len(), "Re-synchronizing existing files");

            for event in initial {
                if let Err(e) = sync.handle_event(event).await {
                    warn!(error = %e, "Rewatch event rejected");
                }
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down sync loop");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Watcher channel closed");
                        break;
                    };
                    debug!(path = %event.full_path, op = %event.op, "Watch event");
                    if let Err(e) = sync.handle_event(event).await {
                        warn!(error = %e, "Watch event rejected");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};

    fn root() -> PathBuf {
        PathBuf::from("/data")
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |ev, p| ev.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_create_and_remove() {
        let created = translate(&root(), &event(EventKind::Create(CreateKind::File), &["/data/a.nc"]));
        assert_eq!(created, vec![WatcherEvent::create("/data/a.nc")]);

        let removed = translate(&root(), &event(EventKind::Remove(RemoveKind::Any), &["/data/a.nc"]));
        assert_eq!(removed, vec![WatcherEvent::remove("/data/a.nc")]);
    }

    #[test]
    fn test_folders_are_reported() {
        let created = translate(&root(), &event(EventKind::Create(CreateKind::Folder), &["/data/sub"]));
        assert_eq!(created, vec![WatcherEvent::create("/data/sub")]);

        let removed = translate(&root(), &event(EventKind::Remove(RemoveKind::Folder), &["/data/sub"]));
        assert_eq!(removed, vec![WatcherEvent::remove("/data/sub")]);

        let hidden = translate(&root(), &event(EventKind::Create(CreateKind::Folder), &["/data/.sub"]));
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_rename_both() {
        let renamed = translate(
            &root(),
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/data/a.nc", "/data/b.nc"],
            ),
        );
        assert_eq!(renamed, vec![WatcherEvent::rename("/data/a.nc", "/data/b.nc")]);
        assert_eq!(renamed[0].op, WatchOp::Rename);
    }

    #[test]
    fn test_rename_from_hidden_is_create() {
        let renamed = translate(
            &root(),
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/data/.a.nc.partial", "/data/a.nc"],
            ),
        );
        assert_eq!(renamed, vec![WatcherEvent::create("/data/a.nc")]);
    }

    #[test]
    fn test_rename_halves() {
        let from = translate(
            &root(),
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/data/a.nc"]),
        );
        let to = translate(
            &root(),
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/data/b.nc"]),
        );
        assert_eq!(from, vec![WatcherEvent::remove("/data/a.nc")]);
        assert_eq!(to, vec![WatcherEvent::create("/data/b.nc")]);
    }

    #[test]
    fn test_close_write_resyncs() {
        let closed = translate(
            &root(),
            &event(EventKind::Access(AccessKind::Close(AccessMode::Write)), &["/data/a.nc"]),
        );
        assert_eq!(closed, vec![WatcherEvent::resync("/data/a.nc")]);
    }

    #[test]
    fn test_hidden_paths_are_ignored() {
        for path in ["/data/.a.nc", "/data/.cache/a.nc"] {
            let created = translate(&root(), &event(EventKind::Create(CreateKind::File), &[path]));
            assert!(created.is_empty(), "reported {}", path);
        }
    }

    #[test]
    fn test_hidden_root_is_not_hidden() {
        assert!(!is_hidden(Path::new("/srv/.data"), Path::new("/srv/.data/a.nc")));
        assert!(is_hidden(Path::new("/srv/.data"), Path::new("/srv/.data/.x/a.nc")));
    }

    #[test]
    fn test_other_events_are_ignored() {
        let modified = translate(
            &root(),
            &event(EventKind::Modify(ModifyKind::Any), &["/data/a.nc"]),
        );
        assert!(modified.is_empty());
    }

    #[test]
    fn test_rewatch_lists_visible_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        std::fs::create_dir_all(dir.path().join(".trash")).unwrap();
        std::fs::write(dir.path().join("a.nc"), b"x").unwrap();
        std::fs::write(dir.path().join("2024/b.nc"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.nc"), b"x").unwrap();
        std::fs::write(dir.path().join(".trash/c.nc"), b"x").unwrap();

        let events = rewatch_events(dir.path());
        let paths: Vec<String> = events.iter().map(|e| e.full_path.clone()).collect();

        let a = dir.path().join("a.nc").to_string_lossy().into_owned();
        let b = dir.path().join("2024/b.nc").to_string_lossy().into_owned();
        assert_eq!(
            paths,
            vec![
                format!("{}{}{}", b, catalog_common::RENAME_SEPARATOR, b),
                format!("{}{}{}", a, catalog_common::RENAME_SEPARATOR, a),
            ]
        );
        assert!(events.iter().all(|e| e.op == WatchOp::Rename));
    }

    // ========================================================================
    // Directory expansion
    // ========================================================================

    #[test]
    fn test_created_directory_expands_to_its_files() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("2024");
        std::fs::create_dir_all(sub.join("jan")).unwrap();
        std::fs::write(sub.join("a.nc"), b"x").unwrap();
        std::fs::write(sub.join("jan/b.nc"), b"x").unwrap();

        let expanded = expand_directories(WatcherEvent::create(sub.to_string_lossy()));

        let a = sub.join("a.nc").to_string_lossy().into_owned();
        let b = sub.join("jan/b.nc").to_string_lossy().into_owned();
        assert_eq!(expanded, vec![WatcherEvent::resync(&a), WatcherEvent::resync(&b)]);
    }

    #[test]
    fn test_renamed_directory_removes_old_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let new = dir.path().join("new");
        std::fs::create_dir_all(&new).unwrap();
        std::fs::write(new.join("x.nc"), b"x").unwrap();
        let old = dir.path().join("old").to_string_lossy().into_owned();

        let expanded = expand_directories(WatcherEvent::rename(&old, &new.to_string_lossy()));

        let x = new.join("x.nc").to_string_lossy().into_owned();
        assert_eq!(expanded, vec![WatcherEvent::remove(old), WatcherEvent::resync(&x)]);
    }

    #[test]
    fn test_file_events_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.nc");
        std::fs::write(&file, b"x").unwrap();
        let path = file.to_string_lossy().into_owned();

        for event in [
            WatcherEvent::create(path.clone()),
            WatcherEvent::remove(dir.path().to_string_lossy()),
            WatcherEvent::resync(&path),
        ] {
            assert_eq!(expand_directories(event.clone()), vec![event]);
        }
    }
}
