// SPDX-License-Identifier: PMPL-1.0-or-later
//! Embedded driver.
//!
//! Runs in-process over a `StorageBackend`: redb when a path is configured,
//! memory otherwise. Each partition `app__collection` is a namespace of the
//! backend, keyed by `_id`. Queries are evaluated in-process against every
//! record of the namespace, so this driver suits small local deployments
//! and tests rather than large collections.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use datagate_query::{Entity, Query, ID_FIELD};
use datagate_storage::{InMemoryBackend, StorageBackend, TypedStore};
use tracing::debug;

use crate::driver::{matches_in_scope, scope_owner, Driver, FindSpec, UpdateResult};
use crate::entity::{entity_id, merge_patch};
use crate::error::GatewayError;
use crate::partition::{collection_from_physical, to_physical_name, BackendKind, NamingMode, PartitionKey};
use crate::selector::{AppScope, EMBEDDED_DRIVER};

/// Namespace listing every partition ever written. Physical names start
/// with a non-empty app name, so this cannot collide with one.
const PARTITION_CATALOG: &str = "__partitions";

type Records = TypedStore<Arc<dyn StorageBackend>>;

pub struct EmbeddedDriver {
    backend: Arc<dyn StorageBackend>,
    scope: AppScope,
    name: String,
}

impl EmbeddedDriver {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            scope: AppScope::All,
            name: EMBEDDED_DRIVER.to_string(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Open (or create) a persistent redb file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let backend = datagate_storage::RedbBackend::open(path).map_err(|e| {
            GatewayError::InvalidConfig(format!("cannot open embedded store {}: {e}", path.display()))
        })?;
        Ok(Self::new(Arc::new(backend)))
    }

    pub fn with_scope(mut self, scope: AppScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn records(&self, key: &PartitionKey) -> Result<(String, Records), GatewayError> {
        let physical = to_physical_name(key, BackendKind::Embedded, NamingMode::Unified)?;
        let store = TypedStore::new(Arc::clone(&self.backend), &physical);
        Ok((physical, store))
    }

    fn catalog(&self) -> Records {
        TypedStore::new(Arc::clone(&self.backend), PARTITION_CATALOG)
    }

    /// Whether `entity` is visible under `key` for `query`.
    fn visible(key: &PartitionKey, query: &Query, entity: &Entity) -> bool {
        matches_in_scope(query, scope_owner(key, query), entity)
    }

    /// Every visible match, in `_id` order.
    async fn scan(
        &self,
        key: &PartitionKey,
        query: &Query,
        operation: &'static str,
    ) -> Result<Vec<Entity>, GatewayError> {
        let (_, records) = self.records(key)?;

        if let Some(id) = query.id_lookup() {
            let found: Option<Entity> = records
                .get(id)
                .await
                .map_err(|e| GatewayError::backend(operation, key, e))?;
            return Ok(found
                .filter(|entity| Self::visible(key, query, entity))
                .into_iter()
                .collect());
        }

        let entries = records
            .entries::<Entity>()
            .await
            .map_err(|e| GatewayError::backend(operation, key, e))?;
        Ok(entries
            .into_iter()
            .map(|(_, entity)| entity)
            .filter(|entity| Self::visible(key, query, entity))
            .collect())
    }
}

#[async_trait]
impl Driver for EmbeddedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn supports_app(&self, app_name: &str) -> bool {
        self.scope.includes(app_name)
    }

    async fn insert(&self, key: &PartitionKey, entity: Entity) -> Result<(), GatewayError> {
        let (physical, records) = self.records(key)?;
        let id = entity_id(&entity)
            .ok_or(GatewayError::MissingRequiredField(ID_FIELD))?
            .to_string();
        let inserted = records
            .insert_new(&id, &entity)
            .await
            .map_err(|e| GatewayError::backend("insert", key, e))?;
        if !inserted {
            return Err(GatewayError::duplicate(&id, key));
        }
        self.catalog()
            .put(&physical, &true)
            .await
            .map_err(|e| GatewayError::backend("insert", key, e))?;
        debug!(partition = %physical, %id, "embedded insert");
        Ok(())
    }

    async fn get_by_id(&self, key: &PartitionKey, id: &str) -> Result<Option<Entity>, GatewayError> {
        Ok(self
            .scan(key, &Query::by_id(id), "get_by_id")
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        key: &PartitionKey,
        query: &Query,
        spec: &FindSpec,
    ) -> Result<Vec<Entity>, GatewayError> {
        let matched = self.scan(key, query, "find").await?;
        Ok(spec.apply(matched))
    }

    async fn replace(&self, key: &PartitionKey, entity: Entity) -> Result<u64, GatewayError> {
        let (_, records) = self.records(key)?;
        let id = entity_id(&entity)
            .ok_or(GatewayError::MissingRequiredField(ID_FIELD))?
            .to_string();
        let exists = records
            .get::<Entity>(&id)
            .await
            .map_err(|e| GatewayError::backend("replace", key, e))?
            .is_some();
        if !exists {
            return Ok(0);
        }
        records
            .put(&id, &entity)
            .await
            .map_err(|e| GatewayError::backend("replace", key, e))?;
        Ok(1)
    }

    async fn patch(
        &self,
        key: &PartitionKey,
        query: &Query,
        patch: &Entity,
        multi: bool,
    ) -> Result<UpdateResult, GatewayError> {
        let (_, records) = self.records(key)?;
        let matched = FindSpec::for_write(multi).apply(self.scan(key, query, "update").await?);

        let mut result = UpdateResult::default();
        for mut entity in matched {
            result.n += 1;
            if !merge_patch(&mut entity, patch) {
                continue;
            }
            let Some(id) = entity_id(&entity).map(str::to_string) else { continue };
            records
                .put(&id, &entity)
                .await
                .map_err(|e| GatewayError::backend("update", key, e))?;
            result.n_modified += 1;
        }
        Ok(result)
    }

    async fn remove(&self, key: &PartitionKey, query: &Query, multi: bool) -> Result<u64, GatewayError> {
        let (_, records) = self.records(key)?;
        let matched = FindSpec::for_write(multi).apply(self.scan(key, query, "remove").await?);

        let mut removed = 0;
        for entity in &matched {
            let Some(id) = entity_id(entity) else { continue };
            if records
                .delete(id)
                .await
                .map_err(|e| GatewayError::backend("remove", key, e))?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_partition_names(&self, app_name: &str) -> Result<Vec<String>, GatewayError> {
        let physical = self.catalog().keys().await.map_err(|e| {
            GatewayError::backend("list_partition_names", &PartitionKey::unowned(app_name, "*"), e)
        })?;
        Ok(physical
            .iter()
            .filter_map(|name| collection_from_physical(app_name, name, BackendKind::Embedded))
            .collect())
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        self.backend.flush().await.map_err(|e| {
            GatewayError::backend("shutdown", &PartitionKey::unowned(self.name.as_str(), "*"), e)
        })
    }
}
