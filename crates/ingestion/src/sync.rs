//! Keeps catalog rows in step with the files they describe.
//!
//! A file is either untracked (no rows) or tracked (rows replaced wholesale
//! on every index). Renames are a Remove of the old path followed by a
//! Create of the new one, run as one job under a ticket on both paths.

use std::path::Path;
use std::sync::Arc;

use tokio::task;
use tracing::{debug, info, instrument, warn};

use catalog_common::{CatalogError, CatalogResult, FileRef, SyncOp, WatcherEvent};
use netcdf_reader::{extract_metadata, DatasetOpener};
use storage::{CatalogStore, FileService};

use crate::sequencer::PathSequencer;
use crate::worker_pool::WorkerPool;

#[derive(Clone)]
pub struct CatalogSynchronizer {
    opener: Arc<dyn DatasetOpener>,
    store: Arc<dyn CatalogStore>,
    pool: Arc<WorkerPool>,
    sequencer: Arc<PathSequencer>,
    watch_root: Option<FileService>,
}

impl CatalogSynchronizer {
    pub fn new(
        opener: Arc<dyn DatasetOpener>,
        store: Arc<dyn CatalogStore>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            opener,
            store,
            pool,
            sequencer: Arc::new(PathSequencer::new()),
            watch_root: None,
        }
    }

    /// Map watcher paths through `files`, which must use the mirrored layout.
    pub fn with_watch_root(mut self, files: FileService) -> Self {
        self.watch_root = Some(files);
        self
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Extract the file's metadata and replace its catalog rows.
    ///
    /// Extraction finishes before the store is touched, so a file that
    /// can't be read keeps whatever rows it had.
    #[instrument(skip(self, file), fields(path = %file.virtual_path))]
    pub async fn index_file(&self, file: &FileRef) -> CatalogResult<usize> {
        let opener = self.opener.clone();
        let real_path = file.real_path.clone();
        let path = file.catalog_path().to_string();

        let entries = task::spawn_blocking(move || {
            let dataset = opener.open(&real_path)?;
            extract_metadata(dataset.as_ref(), &path)
        })
        .await
        .map_err(|e| CatalogError::JobFault(format!("extraction task failed: {}", e)))?
        .map_err(|e| match e {
            CatalogError::ExtractionFailure { .. } => e,
            other => CatalogError::ExtractionFailure {
                path: file.catalog_path().to_string(),
                reason: other.to_string(),
            },
        })?;

        self.store
            .replace_entries(file.catalog_path(), &entries)
            .await?;

        info!(rows = entries.len(), "Indexed file");
        Ok(entries.len())
    }

    /// Drop every catalog row for the file, or for every file below it when
    /// the path was a directory.
    #[instrument(skip(self, file), fields(path = %file.virtual_path))]
    pub async fn remove_file(&self, file: &FileRef) -> CatalogResult<u64> {
        let removed = self
            .store
            .delete_entries_for_path(file.catalog_path())
            .await?
            + self.store.delete_entries_under(&file.subtree_prefix()).await?;
        info!(rows = removed, "Removed file from catalog");
        Ok(removed)
    }

    /// Queue an index of the file on the worker pool.
    pub async fn submit_index(&self, file: FileRef) -> CatalogResult<()> {
        self.submit(vec![Step::Index(file)]).await
    }

    /// Queue removal of the file's rows on the worker pool.
    pub async fn submit_remove(&self, file: FileRef) -> CatalogResult<()> {
        self.submit(vec![Step::Remove(file)]).await
    }

    /// Index the file before returning, still ordered after queued work on
    /// the same path.
    pub async fn index_now(&self, file: &FileRef) -> CatalogResult<usize> {
        let _turn = self.sequencer.ticket([file.catalog_path()]).wait().await;
        self.index_file(file).await
    }

    /// Remove the file's rows before returning, ordered like [`Self::index_now`].
    pub async fn remove_now(&self, file: &FileRef) -> CatalogResult<u64> {
        let _turn = self
            .sequencer
            .ticket_scoped([file.catalog_path()], [file.subtree_prefix()])
            .wait()
            .await;
        self.remove_file(file).await
    }

    /// Turn a watcher event into one pool job.
    #[instrument(skip(self, event), fields(path = %event.full_path, op = ?event.op))]
    pub async fn handle_event(&self, event: WatcherEvent) -> CatalogResult<()> {
        let files = self.watch_root.as_ref().ok_or_else(|| {
            CatalogError::Internal("synchronizer has no watch root".to_string())
        })?;

        let steps = event
            .into_ops()?
            .into_iter()
            .map(|op| -> CatalogResult<Step> {
                let file = files.from_full_path(Path::new(op.full_path()))?;
                Ok(match op {
                    SyncOp::Remove(_) => Step::Remove(file),
                    SyncOp::Create(_) => Step::Index(file),
                })
            })
            .collect::<CatalogResult<Vec<Step>>>()?;

        self.submit(steps).await
    }

    /// Take the ticket now, in event order, then run the steps on the pool.
    async fn submit(&self, steps: Vec<Step>) -> CatalogResult<()> {
        let subtrees = steps.iter().filter_map(|s| match s {
            Step::Remove(file) => Some(file.subtree_prefix()),
            Step::Index(_) => None,
        });
        let ticket = self.sequencer.ticket_scoped(
            steps.iter().map(|s| s.file().catalog_path().to_string()),
            subtrees,
        );
        let this = self.clone();

        self.pool
            .submit(async move {
                let _turn = ticket.wait().await;
                this.run_steps(steps).await
            })
            .await
    }

    /// Run every step in order, returning the first error.
    async fn run_steps(&self, steps: Vec<Step>) -> CatalogResult<()> {
        let mut first_error = None;

        for step in steps {
            let result = match &step {
                Step::Remove(file) => self.remove_file(file).await.map(|_| ()),
                Step::Index(file) => self.index_file(file).await.map(|_| ()),
            };

            if let Err(e) = result {
                warn!(path = %step.file().virtual_path, error = %e, "Sync step failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Sync steps complete");
                Ok(())
            }
        }
    }
}

#[derive(Debug)]
enum Step {
    Remove(FileRef),
    Index(FileRef),
}

impl Step {
    fn file(&self) -> &FileRef {
        match self {
            Step::Remove(file) | Step::Index(file) => file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_common::EntryType;
    use netcdf_reader::MemoryOpener;
    use storage::MemoryCatalog;
    use test_utils::{pressure_dataset, sample_dataset};

    struct Harness {
        sync: CatalogSynchronizer,
        opener: MemoryOpener,
        store: Arc<MemoryCatalog>,
        files: FileService,
    }

    fn harness() -> Harness {
        let opener = MemoryOpener::new();
        let store = Arc::new(MemoryCatalog::new());
        let pool = Arc::new(WorkerPool::new(4, 64, 64));
        let files = FileService::mirrored("/watch");
        let sync = CatalogSynchronizer::new(Arc::new(opener.clone()), store.clone(), pool)
            .with_watch_root(files.clone());
        Harness {
            sync,
            opener,
            store,
            files,
        }
    }

    #[tokio::test]
    async fn test_index_file_writes_rows() {
        let h = harness();
        h.opener.insert("/watch/a.nc", sample_dataset());
        let file = h.files.resolve("a.nc").unwrap();

        let rows = h.sync.index_file(&file).await.unwrap();

        assert_eq!(rows as u64, h.store.count_for_path("a.nc").await.unwrap());
        assert!(rows > 0);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let h = harness();
        h.opener.insert("/watch/a.nc", sample_dataset());
        let file = h.files.resolve("a.nc").unwrap();

        h.sync.index_file(&file).await.unwrap();
        let first = h.store.query_all_distinct().await.unwrap();
        h.sync.index_file(&file).await.unwrap();
        let second = h.store.query_all_distinct().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unreadable_file_keeps_previous_rows() {
        let h = harness();
        h.opener.insert("/watch/a.nc", sample_dataset());
        let file = h.files.resolve("a.nc").unwrap();
        h.sync.index_file(&file).await.unwrap();
        let before = h.store.count_for_path("a.nc").await.unwrap();

        h.opener.remove(std::path::Path::new("/watch/a.nc"));
        let err = h.sync.index_file(&file).await.unwrap_err();

        assert!(matches!(err, CatalogError::ExtractionFailure { ref path, .. } if path == "a.nc"));
        assert_eq!(h.store.count_for_path("a.nc").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_rename_event_moves_rows() {
        let h = harness();
        h.opener.insert("/watch/old.nc", sample_dataset());
        h.sync
            .index_file(&h.files.resolve("old.nc").unwrap())
            .await
            .unwrap();

        h.opener.remove(std::path::Path::new("/watch/old.nc"));
        h.opener.insert("/watch/new.nc", sample_dataset());
        h.sync
            .handle_event(WatcherEvent::rename("/watch/old.nc", "/watch/new.nc"))
            .await
            .unwrap();
        h.sync.pool().wait_idle().await;

        assert_eq!(h.store.count_for_path("old.nc").await.unwrap(), 0);
        assert!(h.store.count_for_path("new.nc").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_events_on_one_path_apply_in_order() {
        let h = harness();
        h.opener.insert("/watch/a.nc", sample_dataset());

        for _ in 0..20 {
            h.sync
                .handle_event(WatcherEvent::create("/watch/a.nc"))
                .await
                .unwrap();
            h.sync
                .handle_event(WatcherEvent::remove("/watch/a.nc"))
                .await
                .unwrap();
        }
        h.sync
            .handle_event(WatcherEvent::create("/watch/a.nc"))
            .await
            .unwrap();
        h.sync.pool().wait_idle().await;

        let expected = extract_metadata(&sample_dataset(), "a.nc").unwrap().len() as u64;
        assert_eq!(h.store.count_for_path("a.nc").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_directory_remove_drops_files_below_it() {
        let h = harness();
        h.opener.insert("/watch/obs/a.nc", sample_dataset());
        h.opener.insert("/watch/obs/deep/p.nc", pressure_dataset());
        h.opener.insert("/watch/observer.nc", sample_dataset());
        for path in ["obs/a.nc", "obs/deep/p.nc", "observer.nc"] {
            h.sync
                .index_file(&h.files.resolve(path).unwrap())
                .await
                .unwrap();
        }

        h.sync
            .handle_event(WatcherEvent::remove("/watch/obs"))
            .await
            .unwrap();
        h.sync.pool().wait_idle().await;

        assert_eq!(h.store.count_for_path("obs/a.nc").await.unwrap(), 0);
        assert_eq!(h.store.count_for_path("obs/deep/p.nc").await.unwrap(), 0);
        assert!(h.store.count_for_path("observer.nc").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_event_outside_root_is_rejected() {
        let h = harness();
        let err = h
            .sync
            .handle_event(WatcherEvent::create("/elsewhere/a.nc"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_independent_files_are_kept_apart() {
        let h = harness();
        h.opener.insert("/watch/sst.nc", sample_dataset());
        h.opener.insert("/watch/obs/p.nc", pressure_dataset());

        h.sync
            .handle_event(WatcherEvent::create("/watch/sst.nc"))
            .await
            .unwrap();
        h.sync
            .handle_event(WatcherEvent::create("/watch/obs/p.nc"))
            .await
            .unwrap();
        h.sync.pool().wait_idle().await;

        let all = h.store.query_all_distinct().await.unwrap();
        assert!(all
            .iter()
            .any(|e| e.path == "obs/p.nc" && e.entry_type == EntryType::Variable && e.key == "pressure"));
        assert!(all
            .iter()
            .any(|e| e.path == "sst.nc" && e.entry_type == EntryType::Variable && e.key == "sst"));
    }

    #[tokio::test]
    async fn test_index_now_runs_inline() {
        let h = harness();
        h.opener.insert("/watch/a.nc", sample_dataset());
        let file = h.files.resolve("a.nc").unwrap();

        let rows = h.sync.index_now(&file).await.unwrap();
        assert_eq!(h.store.count_for_path("a.nc").await.unwrap(), rows as u64);

        assert_eq!(h.sync.remove_now(&file).await.unwrap(), rows as u64);
    }
}
