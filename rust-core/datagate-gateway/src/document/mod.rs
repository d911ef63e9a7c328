// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document-store driver.
//!
//! Each app gets its own database and one cached connection to it, unless a
//! unified database is configured, in which case every app shares a single
//! connection and collections are prefixed with the app name. Idle per-app
//! connections are closed by the manager's reaper.
//!
//! Queries are translated into the store's native filter language and
//! executed there; disjunctions need no special handling.

pub mod filter;
pub mod server;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use datagate_query::{Entity, Query, ID_FIELD};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::driver::{scope_owner, Driver, FindSpec, UpdateResult};
use crate::error::GatewayError;
use crate::partition::{
    collection_from_physical, database_name, to_physical_name, BackendKind, NamingMode, PartitionKey,
};
use crate::selector::AppScope;

pub use filter::to_native_filter;
pub use server::{
    DocumentConnector, DocumentDatabase, MemoryDocumentServer, NativeFindOptions, UpdateOutcome,
};

/// Errors raised by a document-store connection.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("connection to '{0}' is closed")]
    ConnectionClosed(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

struct CachedConnection {
    database: Arc<dyn DocumentDatabase>,
    last_used: Instant,
}

pub struct DocumentStoreDriver {
    connector: Arc<dyn DocumentConnector>,
    unified_database: Option<String>,
    connections: Mutex<HashMap<String, CachedConnection>>,
    scope: AppScope,
    name: String,
}

impl DocumentStoreDriver {
    pub fn new(connector: Arc<dyn DocumentConnector>, unified_database: Option<String>) -> Self {
        Self {
            connector,
            unified_database,
            connections: Mutex::new(HashMap::new()),
            scope: AppScope::All,
            name: crate::selector::DOCUMENT_DRIVER.to_string(),
        }
    }

    pub fn with_scope(mut self, scope: AppScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn naming(&self) -> NamingMode {
        if self.unified_database.is_some() {
            NamingMode::Unified
        } else {
            NamingMode::PerApp
        }
    }

    /// The cached connection for `app_name`, opening one if needed.
    async fn connection(
        &self,
        key: &PartitionKey,
        operation: &'static str,
    ) -> Result<Arc<dyn DocumentDatabase>, GatewayError> {
        let name = database_name(&key.app_name, self.unified_database.as_deref());
        let mut cache = self.connections.lock().await;

        if let Some(cached) = cache.get_mut(&name) {
            if cached.database.is_open() {
                cached.last_used = Instant::now();
                return Ok(Arc::clone(&cached.database));
            }
        }

        let database = self
            .connector
            .connect(&name)
            .await
            .map_err(|e| GatewayError::backend(operation, key, e))?;
        info!(database = %name, "opened document store connection");
        cache.insert(
            name,
            CachedConnection {
                database: Arc::clone(&database),
                last_used: Instant::now(),
            },
        );
        Ok(database)
    }

    fn collection(&self, key: &PartitionKey) -> Result<String, GatewayError> {
        to_physical_name(key, BackendKind::DocumentStore, self.naming())
    }

    fn filter(key: &PartitionKey, query: &Query) -> Value {
        to_native_filter(query, scope_owner(key, query))
    }
}

#[async_trait]
impl Driver for DocumentStoreDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::DocumentStore
    }

    fn supports_app(&self, app_name: &str) -> bool {
        self.scope.includes(app_name)
    }

    async fn insert(&self, key: &PartitionKey, entity: Entity) -> Result<(), GatewayError> {
        let collection = self.collection(key)?;
        let db = self.connection(key, "insert").await?;
        db.insert_one(&collection, entity).await.map_err(|e| match e {
            DocumentStoreError::DuplicateKey(id) => GatewayError::duplicate(&id, key),
            other => GatewayError::backend("insert", key, other),
        })
    }

    async fn get_by_id(&self, key: &PartitionKey, id: &str) -> Result<Option<Entity>, GatewayError> {
        let collection = self.collection(key)?;
        let db = self.connection(key, "get_by_id").await?;
        let options = NativeFindOptions {
            limit: Some(2),
            ..NativeFindOptions::default()
        };
        let mut found = db
            .find(&collection, &Self::filter(key, &Query::by_id(id)), &options)
            .await
            .map_err(|e| GatewayError::backend("get_by_id", key, e))?;
        if found.len() > 1 {
            return Err(GatewayError::TooManyResults {
                context: format!("{ID_FIELD} '{id}' in {key}"),
                found: found.len(),
            });
        }
        Ok(found.pop())
    }

    async fn find(
        &self,
        key: &PartitionKey,
        query: &Query,
        spec: &FindSpec,
    ) -> Result<Vec<Entity>, GatewayError> {
        let collection = self.collection(key)?;
        let db = self.connection(key, "find").await?;
        let filter = Self::filter(key, query);
        debug!(%collection, %filter, "document store find");
        let options = NativeFindOptions {
            sort: spec.sort.clone(),
            limit: spec.limit,
            skip: spec.skip,
            keys_only: spec.key_only,
        };
        db.find(&collection, &filter, &options)
            .await
            .map_err(|e| GatewayError::backend("find", key, e))
    }

    async fn replace(&self, key: &PartitionKey, entity: Entity) -> Result<u64, GatewayError> {
        let collection = self.collection(key)?;
        let id = crate::entity::entity_id(&entity)
            .ok_or(GatewayError::MissingRequiredField("_id"))?
            .to_string();
        let db = self.connection(key, "replace").await?;
        db.replace_one(&collection, &json!({ ID_FIELD: id }), entity)
            .await
            .map_err(|e| GatewayError::backend("replace", key, e))
    }

    async fn patch(
        &self,
        key: &PartitionKey,
        query: &Query,
        patch: &Entity,
        multi: bool,
    ) -> Result<UpdateResult, GatewayError> {
        let collection = self.collection(key)?;
        let db = self.connection(key, "update").await?;
        let outcome = db
            .update(&collection, &Self::filter(key, query), &json!({ "$set": patch }), multi)
            .await
            .map_err(|e| GatewayError::backend("update", key, e))?;
        Ok(UpdateResult {
            n: outcome.matched,
            n_modified: outcome.modified,
        })
    }

    async fn remove(&self, key: &PartitionKey, query: &Query, multi: bool) -> Result<u64, GatewayError> {
        let collection = self.collection(key)?;
        let db = self.connection(key, "remove").await?;
        db.delete(&collection, &Self::filter(key, query), multi)
            .await
            .map_err(|e| GatewayError::backend("remove", key, e))
    }

    async fn list_partition_names(&self, app_name: &str) -> Result<Vec<String>, GatewayError> {
        let key = PartitionKey::unowned(app_name, "*");
        let db = self.connection(&key, "list_partition_names").await?;
        let names = db
            .list_collection_names()
            .await
            .map_err(|e| GatewayError::backend("list_partition_names", &key, e))?;
        Ok(match self.naming() {
            NamingMode::PerApp => names,
            NamingMode::Unified => names
                .iter()
                .filter_map(|name| collection_from_physical(app_name, name, BackendKind::DocumentStore))
                .collect(),
        })
    }

    async fn reap_idle(&self, idle_timeout: Duration) -> usize {
        if self.unified_database.is_some() {
            return 0;
        }
        let mut cache = self.connections.lock().await;
        let idle: Vec<String> = cache
            .iter()
            .filter(|(_, c)| c.last_used.elapsed() > idle_timeout)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &idle {
            if let Some(cached) = cache.remove(name) {
                cached.database.close().await;
                info!(database = %name, "closed idle document store connection");
            }
        }
        idle.len()
    }

    async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        let mut cache = self.connections.lock().await;
        for (name, cached) in cache.drain() {
            cached.database.close().await;
            debug!(database = %name, "closed document store connection");
        }
        Ok(())
    }
}
