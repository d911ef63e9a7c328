// SPDX-License-Identifier: PMPL-1.0-or-later
//! Datagate Gateway
//!
//! A data-access gateway giving applications one CRUD interface over
//! pluggable storage backends. Records are addressed by a partition key of
//! `(app_name, collection_name, owner)` and queried with the portable query
//! language from `datagate-query`.
//!
//! Three drivers ship with the gateway:
//!
//! - [`DocumentStoreDriver`]: native filters against a document database,
//!   one cached connection per app, reaped when idle.
//! - [`KindStoreDriver`]: one kind per partition; disjunctions fan out into
//!   concurrent single-kind queries that are merged and de-duplicated.
//! - [`EmbeddedDriver`]: in-process evaluation over redb or memory.
//!
//! ```rust
//! use datagate_gateway::{DataStoreManager, GatewayConfig, PartitionKey};
//! use datagate_query::QueryOptions;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let manager = DataStoreManager::in_memory(GatewayConfig::default()).await.unwrap();
//! let key = PartitionKey::new("com.example.notes", "notes", "alice");
//!
//! let record = json!({"title": "hello"}).as_object().cloned().unwrap();
//! let ack = manager.insert(&key, Some("n1"), record, &QueryOptions::default()).await.unwrap();
//! assert_eq!(ack.entity["_owner"], "alice");
//!
//! let found = manager.find(&key, &json!({"title": "hello"}), &QueryOptions::default()).await.unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! ```

pub mod config;
pub mod document;
pub mod driver;
pub mod embedded;
pub mod entity;
pub mod error;
pub mod kind;
pub mod manager;
pub mod partition;
pub mod selector;

pub use config::{CustomDriverConfig, GatewayConfig};
pub use document::{DocumentStoreDriver, DocumentStoreError, MemoryDocumentServer};
pub use driver::{Driver, FindSpec, UpdateResult};
pub use embedded::EmbeddedDriver;
pub use error::{BackendError, GatewayError};
pub use kind::{BackendKindStore, KindStore, KindStoreDriver, KindStoreError};
pub use manager::{DataStoreManager, RemoveResult, WriteAck};
pub use partition::{to_physical_name, BackendKind, NamingMode, PartitionKey};
pub use selector::{select_driver, AppScope, DriverRegistry, DriverSet};
