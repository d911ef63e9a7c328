// SPDX-License-Identifier: PMPL-1.0-or-later
// Datagate Storage Substrate
//
// Ordered key-value storage underneath the kind-based and embedded drivers.
// Drivers talk to a `StorageBackend` through a `TypedStore`, which scopes
// every key to one namespace (a kind, or a physical collection name) and
// stores JSON values.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait.
// - [`error`] -- The `StorageError` enum.
// - [`memory`] -- In-memory `BTreeMap` backend for tests and ephemeral use.
// - [`typed`] -- Namespaced JSON access on top of any backend.
// - [`redb_backend`] -- Single-file persistent backend (feature `redb-backend`).
//
// # Example
//
// ```rust
// use std::sync::Arc;
// use datagate_storage::{InMemoryBackend, StorageBackend, TypedStore};
//
// # tokio_test::block_on(async {
// let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
// let store = TypedStore::new(backend, "notes__owner1");
//
// assert!(store.insert_new("n1", &serde_json::json!({"title": "a"})).await.unwrap());
// assert!(!store.insert_new("n1", &serde_json::json!({"title": "b"})).await.unwrap());
//
// let val: serde_json::Value = store.get("n1").await.unwrap().unwrap();
// assert_eq!(val["title"], "a");
// # });
// ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod typed;

#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::InMemoryBackend;
pub use typed::TypedStore;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
