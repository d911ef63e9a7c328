// SPDX-License-Identifier: PMPL-1.0-or-later
// Storage backend trait.
//
// An ordered byte-keyed map with an atomic create-if-absent write. Ordering
// matters: namespaces are laid out as key prefixes and enumerated with
// `scan_prefix`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;

/// A pluggable, ordered key-value storage backend.
///
/// Keys and values are opaque bytes; [`crate::typed::TypedStore`] adds
/// namespacing and JSON encoding on top.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value, overwriting any previous value for `key`.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Store a value only if `key` is absent.
    ///
    /// The existence check and the write happen atomically. Returns
    /// `Ok(false)` and leaves the stored value untouched if the key exists.
    async fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool, StorageError>;

    /// Returns `Ok(true)` if the key existed and was removed.
    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// All (key, value) pairs whose key starts with `prefix`, in key order,
    /// at most `limit` of them.
    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Make previously written data durable. No-op for in-memory backends.
    async fn flush(&self) -> Result<(), StorageError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value).await
    }

    async fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool, StorageError> {
        (**self).insert_new(key, value).await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        (**self).delete(key).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        (**self).scan_prefix(prefix, limit).await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        (**self).flush().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
