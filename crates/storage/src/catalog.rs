//! Metadata catalog persisted in SQLite.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

use catalog_common::{CatalogError, CatalogResult, EntryType, MetadataEntry, Value};

/// Relational store of catalog entries, keyed by file path.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Delete every entry for `path`, returning how many rows went away.
    async fn delete_entries_for_path(&self, path: &str) -> CatalogResult<u64>;

    /// Delete every entry whose path starts with `prefix`.
    async fn delete_entries_under(&self, prefix: &str) -> CatalogResult<u64>;

    /// Insert entries for `path` as one transaction.
    async fn insert_entries(&self, path: &str, entries: &[MetadataEntry]) -> CatalogResult<()>;

    /// Replace every entry for `path`.
    ///
    /// If the insert fails the path is left with no entries rather than
    /// stale ones.
    async fn replace_entries(&self, path: &str, entries: &[MetadataEntry]) -> CatalogResult<()> {
        self.delete_entries_for_path(path).await?;
        self.insert_entries(path, entries).await
    }

    /// Every distinct entry, ordered by path, type, key.
    async fn query_all_distinct(&self) -> CatalogResult<Vec<MetadataEntry>>;

    async fn count_for_path(&self, path: &str) -> CatalogResult<u64>;
}

fn store_error(context: &str) -> impl Fn(sqlx::Error) -> CatalogError + '_ {
    move |e| CatalogError::StoreFailure(format!("{}: {}", context, e))
}

/// SQLite-backed catalog.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Open or create the catalog database at the given path.
    pub async fn open(path: &Path) -> CatalogResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_error("Failed to open SQLite database"))?;

        let catalog = Self { pool };
        catalog.migrate().await?;

        info!(path = %path.display(), "Opened catalog database");
        Ok(catalog)
    }

    /// Open an in-memory catalog.
    pub async fn open_memory() -> CatalogResult<Self> {
        // A single connection, since every in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(store_error("Failed to open in-memory database"))?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    async fn migrate(&self) -> CatalogResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                id INTEGER PRIMARY KEY,
                path TEXT NOT NULL,
                type TEXT NOT NULL,
                key TEXT NOT NULL,
                kind TEXT,
                value BLOB,
                indexed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_error("Migration failed"))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_metadata_path ON metadata(path)")
            .execute(&self.pool)
            .await
            .map_err(store_error("Migration failed"))?;

        Ok(())
    }
}

async fn insert_rows(
    tx: &mut Transaction<'_, Sqlite>,
    path: &str,
    entries: &[MetadataEntry],
) -> Result<(), sqlx::Error> {
    let indexed_at = Utc::now().to_rfc3339();

    for entry in entries {
        let kind = entry.value.as_ref().map(|v| v.kind_tag());
        let value = entry.value.as_ref().map(|v| v.to_stored());

        sqlx::query(
            "INSERT INTO metadata (path, type, key, kind, value, indexed_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(path)
        .bind(entry.entry_type.as_str())
        .bind(&entry.key)
        .bind(kind)
        .bind(value)
        .bind(&indexed_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

type MetadataRow = (String, String, String, Option<String>, Option<Vec<u8>>);

fn entry_from_row(row: MetadataRow) -> CatalogResult<MetadataEntry> {
    let (path, type_code, key, kind, raw) = row;

    let entry_type = EntryType::from_code(&type_code).ok_or_else(|| {
        CatalogError::StoreFailure(format!("Unknown entry type '{}' for {}", type_code, path))
    })?;

    let value = match (kind, raw) {
        (Some(kind), Some(raw)) => Some(Value::from_stored(&kind, &raw)?),
        _ => None,
    };

    Ok(MetadataEntry {
        path,
        entry_type,
        key,
        value,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn delete_entries_for_path(&self, path: &str) -> CatalogResult<u64> {
        let result = sqlx::query("DELETE FROM metadata WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(store_error("Delete failed"))?;

        debug!(path = %path, rows = result.rows_affected(), "Deleted catalog entries");
        Ok(result.rows_affected())
    }

    async fn delete_entries_under(&self, prefix: &str) -> CatalogResult<u64> {
        // substr instead of LIKE, so `%` and `_` in file names match literally.
        let result = sqlx::query("DELETE FROM metadata WHERE substr(path, 1, length(?1)) = ?1")
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(store_error("Delete failed"))?;

        debug!(prefix = %prefix, rows = result.rows_affected(), "Deleted catalog subtree");
        Ok(result.rows_affected())
    }

    async fn insert_entries(&self, path: &str, entries: &[MetadataEntry]) -> CatalogResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("Begin failed"))?;

        insert_rows(&mut tx, path, entries)
            .await
            .map_err(store_error("Insert failed"))?;

        tx.commit().await.map_err(store_error("Commit failed"))?;

        debug!(path = %path, rows = entries.len(), "Inserted catalog entries");
        Ok(())
    }

    /// Delete and insert in one transaction, so readers see either the old
    /// entries or the new ones.
    async fn replace_entries(&self, path: &str, entries: &[MetadataEntry]) -> CatalogResult<()> {
        let result: Result<(), sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM metadata WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
            insert_rows(&mut tx, path, entries).await?;
            tx.commit().await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(path = %path, rows = entries.len(), "Replaced catalog entries");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Replace failed, clearing path");
                self.delete_entries_for_path(path).await?;
                Err(CatalogError::StoreFailure(format!("Replace failed: {}", e)))
            }
        }
    }

    async fn query_all_distinct(&self) -> CatalogResult<Vec<MetadataEntry>> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            "SELECT DISTINCT path, type, key, kind, value FROM metadata \
             ORDER BY path, type, key, value",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("Query failed"))?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn count_for_path(&self, path: &str) -> CatalogResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metadata WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("Count failed"))?;

        Ok(count as u64)
    }
}
