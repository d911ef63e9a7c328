// SPDX-License-Identifier: PMPL-1.0-or-later
// Namespaced JSON store.
//
// Wraps any `StorageBackend` and scopes keys to one namespace. Namespace and
// key are joined with the ASCII unit separator (0x1F), which cannot appear in
// physical names, so a namespace never sees keys from another namespace that
// merely shares its prefix.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Separator between namespace and logical key.
pub const NAMESPACE_SEPARATOR: char = '\u{1f}';

/// A typed wrapper around a [`StorageBackend`] scoped to one namespace.
pub struct TypedStore<B: StorageBackend> {
    backend: B,
    namespace: String,
}

impl<B: StorageBackend> TypedStore<B> {
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn prefix(&self) -> String {
        format!("{}{}", self.namespace, NAMESPACE_SEPARATOR)
    }

    fn full_key(&self, key: &str) -> Vec<u8> {
        format!("{}{}", self.prefix(), key).into_bytes()
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to serialize value for '{}/{}': {}",
                self.namespace, key, err
            ))
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to deserialize value for '{}/{}': {}",
                self.namespace, key, err
            ))
        })
    }

    /// Returns `Ok(None)` if the key does not exist.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(&self.full_key(key)).await? {
            Some(bytes) => self.decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Write `value`, overwriting any previous value.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = self.encode(key, value)?;
        self.backend.put(&self.full_key(key), &bytes).await
    }

    /// Write `value` only if `key` is absent; `Ok(false)` if it exists.
    pub async fn insert_new<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, StorageError> {
        let bytes = self.encode(key, value)?;
        self.backend.insert_new(&self.full_key(key), &bytes).await
    }

    /// Returns `Ok(true)` if the key existed and was removed.
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.backend.delete(&self.full_key(key)).await
    }

    /// Every (key, value) pair in the namespace, in key order.
    pub async fn entries<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>, StorageError> {
        let prefix = self.prefix();
        let raw = self.backend.scan_prefix(prefix.as_bytes(), usize::MAX).await?;

        let mut results = Vec::with_capacity(raw.len());
        for (raw_key, raw_value) in raw {
            let key = String::from_utf8_lossy(&raw_key[prefix.len()..]).to_string();
            let value = self.decode(&key, &raw_value)?;
            results.push((key, value));
        }
        Ok(results)
    }

    /// Every logical key in the namespace, in key order.
    pub async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let prefix = self.prefix();
        let raw = self.backend.scan_prefix(prefix.as_bytes(), usize::MAX).await?;
        Ok(raw
            .into_iter()
            .map(|(k, _)| String::from_utf8_lossy(&k[prefix.len()..]).to_string())
            .collect())
    }
}
