//! Catalog store held in process memory.

use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;

use catalog_common::{CatalogError, CatalogResult, MetadataEntry};

use crate::catalog::CatalogStore;

/// Catalog kept in a vector. Useful for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    rows: Mutex<Vec<MetadataEntry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> CatalogResult<std::sync::MutexGuard<'_, Vec<MetadataEntry>>> {
        self.rows
            .lock()
            .map_err(|_| CatalogError::StoreFailure("catalog lock poisoned".to_string()))
    }
}

fn compare(a: &MetadataEntry, b: &MetadataEntry) -> Ordering {
    a.path
        .cmp(&b.path)
        .then(a.entry_type.cmp(&b.entry_type))
        .then(a.key.cmp(&b.key))
        .then_with(|| {
            let stored = |e: &MetadataEntry| e.value.as_ref().map(|v| v.to_stored());
            stored(a).cmp(&stored(b))
        })
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn delete_entries_for_path(&self, path: &str) -> CatalogResult<u64> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|e| e.path != path);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_entries_under(&self, prefix: &str) -> CatalogResult<u64> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|e| !e.path.starts_with(prefix));
        Ok((before - rows.len()) as u64)
    }

    async fn insert_entries(&self, path: &str, entries: &[MetadataEntry]) -> CatalogResult<()> {
        let mut rows = self.rows()?;
        rows.extend(entries.iter().map(|e| MetadataEntry {
            path: path.to_string(),
            ..e.clone()
        }));
        Ok(())
    }

    async fn query_all_distinct(&self) -> CatalogResult<Vec<MetadataEntry>> {
        let mut all = self.rows()?.clone();
        all.sort_by(compare);
        all.dedup();
        Ok(all)
    }

    async fn count_for_path(&self, path: &str) -> CatalogResult<u64> {
        Ok(self.rows()?.iter().filter(|e| e.path == path).count() as u64)
    }
}
