// SPDX-License-Identifier: PMPL-1.0-or-later
// redb-backed persistent storage backend.
//
// One redb file with one table holds every namespace of the embedded driver.
// redb calls are blocking, so each operation runs on the blocking pool.
// Write transactions are serialised by redb, which is what makes
// `insert_new` atomic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, TableError,
};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StorageError;

const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// A persistent storage backend powered by redb.
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBackend {
    /// Open or create a redb database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!("failed to open redb at {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), "opened redb backend");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

fn unavailable(what: &str) -> impl FnOnce(redb::Error) -> StorageError + '_ {
    move |e| StorageError::BackendUnavailable(format!("{what}: {e}"))
}

fn corrupted(what: &str) -> impl FnOnce(redb::Error) -> StorageError + '_ {
    move |e| StorageError::CorruptedData(format!("{what}: {e}"))
}

/// The records table, or `None` if nothing has been written yet.
fn open_for_read(
    txn: &ReadTransaction,
) -> Result<Option<ReadOnlyTable<&'static [u8], &'static [u8]>>, StorageError> {
    match txn.open_table(RECORDS) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(TableError::Storage(e)) => Err(unavailable("open table")(e.into())),
        Err(e) => Err(corrupted("open table")(e.into())),
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| unavailable("read txn")(e.into()))?;
            let Some(table) = open_for_read(&txn)? else {
                return Ok(None);
            };
            let value = table
                .get(key.as_slice())
                .map_err(|e| corrupted("get")(e.into()))?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(|e| unavailable("write txn")(e.into()))?;
            {
                let mut table = txn
                    .open_table(RECORDS)
                    .map_err(|e| unavailable("open table")(e.into()))?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| corrupted("insert")(e.into()))?;
            }
            txn.commit().map_err(|e| corrupted("commit")(e.into()))
        })
        .await
    }

    async fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool, StorageError> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(|e| unavailable("write txn")(e.into()))?;
            let inserted;
            {
                let mut table = txn
                    .open_table(RECORDS)
                    .map_err(|e| unavailable("open table")(e.into()))?;
                let exists = table
                    .get(key.as_slice())
                    .map_err(|e| corrupted("get")(e.into()))?
                    .is_some();
                if !exists {
                    table
                        .insert(key.as_slice(), value.as_slice())
                        .map_err(|e| corrupted("insert")(e.into()))?;
                }
                inserted = !exists;
            }
            txn.commit().map_err(|e| corrupted("commit")(e.into()))?;
            Ok(inserted)
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(|e| unavailable("write txn")(e.into()))?;
            let existed;
            {
                let mut table = txn
                    .open_table(RECORDS)
                    .map_err(|e| unavailable("open table")(e.into()))?;
                existed = table
                    .remove(key.as_slice())
                    .map_err(|e| corrupted("remove")(e.into()))?
                    .is_some();
            }
            txn.commit().map_err(|e| corrupted("commit")(e.into()))?;
            Ok(existed)
        })
        .await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let prefix = prefix.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| unavailable("read txn")(e.into()))?;
            let Some(table) = open_for_read(&txn)? else {
                return Ok(Vec::new());
            };

            let mut results = Vec::new();
            let iter = table
                .range(prefix.as_slice()..)
                .map_err(|e| corrupted("range scan")(e.into()))?;
            for entry in iter {
                if results.len() >= limit {
                    break;
                }
                let (k, v) = entry.map_err(|e| corrupted("scan entry")(e.into()))?;
                let k = k.value().to_vec();
                if !k.starts_with(&prefix) {
                    break;
                }
                results.push((k, v.value().to_vec()));
            }
            Ok(results)
        })
        .await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        // Every write transaction is fsynced on commit.
        Ok(())
    }

    fn name(&self) -> &str {
        "redb"
    }
}
