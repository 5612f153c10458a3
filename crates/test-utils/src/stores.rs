//! Catalog stores with injectable failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use catalog_common::{CatalogError, CatalogResult, MetadataEntry};
use storage::{CatalogStore, MemoryCatalog};

/// A [`MemoryCatalog`] whose writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FailingCatalog {
    inner: MemoryCatalog,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
    inserts: AtomicUsize,
}

impl FailingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of insert calls seen, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogStore for FailingCatalog {
    async fn delete_entries_for_path(&self, path: &str) -> CatalogResult<u64> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CatalogError::StoreFailure(format!("injected delete failure for {}", path)));
        }
        self.inner.delete_entries_for_path(path).await
    }

    async fn delete_entries_under(&self, prefix: &str) -> CatalogResult<u64> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CatalogError::StoreFailure(format!("injected delete failure under {}", prefix)));
        }
        self.inner.delete_entries_under(prefix).await
    }

    async fn insert_entries(&self, path: &str, entries: &[MetadataEntry]) -> CatalogResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(CatalogError::StoreFailure(format!("injected insert failure for {}", path)));
        }
        self.inner.insert_entries(path, entries).await
    }

    async fn query_all_distinct(&self) -> CatalogResult<Vec<MetadataEntry>> {
        self.inner.query_all_distinct().await
    }

    async fn count_for_path(&self, path: &str) -> CatalogResult<u64> {
        self.inner.count_for_path(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_entries;

    #[tokio::test]
    async fn test_failed_replace_leaves_no_rows() {
        let store = FailingCatalog::new();
        store.replace_entries("a.nc", &sample_entries("a.nc")).await.unwrap();
        assert_eq!(store.count_for_path("a.nc").await.unwrap(), 5);

        store.fail_inserts(true);
        let result = store.replace_entries("a.nc", &sample_entries("a.nc")).await;

        assert!(matches!(result, Err(CatalogError::StoreFailure(_))));
        assert_eq!(store.count_for_path("a.nc").await.unwrap(), 0);
        assert_eq!(store.insert_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_rows() {
        let store = FailingCatalog::new();
        store.insert_entries("a.nc", &sample_entries("a.nc")).await.unwrap();

        store.fail_deletes(true);
        tokio_test::assert_err!(store.delete_entries_for_path("a.nc").await);
        assert_eq!(store.count_for_path("a.nc").await.unwrap(), 5);
    }
}
