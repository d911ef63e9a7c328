// SPDX-License-Identifier: PMPL-1.0-or-later
//! The gateway façade.
//!
//! `DataStoreManager` validates partition keys and queries, stamps and
//! guards gateway-managed fields, picks a driver per app and delegates.
//! It also owns the background reaper that closes idle per-app connections.

use std::sync::Arc;
use std::time::Duration;

use datagate_query::{normalize, Entity, Query, QueryOptions, ID_FIELD, OWNER_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::driver::{Driver, FindSpec, UpdateResult};
use crate::entity::{
    entity_id, entity_owner, key_only, new_id, now_millis, strip_fields, DATE_CREATED_FIELD,
    DATE_MODIFIED_FIELD, IMMUTABLE_FIELDS, RESERVED_FIELDS,
};
use crate::error::GatewayError;
use crate::partition::{validate_app_name, PartitionKey};
use crate::selector::{select_driver, DriverRegistry, DriverSet};

/// Acknowledgement of an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteAck {
    pub success: bool,
    /// The record as stored.
    pub entity: Entity,
    /// Non-fatal problems, such as reserved fields that were dropped.
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub n: u64,
}

pub struct DataStoreManager {
    config: GatewayConfig,
    drivers: Arc<DriverSet>,
    reaper: Option<JoinHandle<()>>,
}

impl DataStoreManager {
    /// Validate `config`, build its drivers and start the reaper.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn open(config: GatewayConfig, registry: &DriverRegistry) -> Result<Self, GatewayError> {
        config.validate()?;
        let drivers = Arc::new(DriverSet::resolve(&config, registry)?);

        let reaper = if config.unified_database.is_none() {
            Some(spawn_reaper(
                Arc::clone(&drivers),
                config.reaper_interval(),
                config.idle_timeout(),
            ))
        } else {
            None
        };

        info!(
            default_driver = drivers.default_driver().name(),
            custom_driver = drivers.custom_driver().map(|d| d.name()).unwrap_or("none"),
            unified = config.unified_database.is_some(),
            "data store manager ready"
        );
        Ok(Self {
            config,
            drivers,
            reaper,
        })
    }

    /// A manager over the default in-process drivers.
    pub async fn in_memory(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::open(config, &DriverRegistry::with_defaults()).await
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The driver serving `app_name`.
    pub fn driver_for(&self, app_name: &str) -> &Arc<dyn Driver> {
        select_driver(&self.drivers, app_name)
    }

    /// Live cached connections across all drivers.
    pub async fn connection_count(&self) -> usize {
        let mut total = 0;
        for driver in self.drivers.all() {
            total += driver.connection_count().await;
        }
        total
    }

    /// Stop the reaper and close every driver.
    pub async fn shutdown(mut self) -> Result<(), GatewayError> {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
            // Wait for the task to drop its handle on the drivers.
            let _ = reaper.await;
        }
        for driver in self.drivers.all() {
            driver.shutdown().await?;
        }
        info!("data store manager shut down");
        Ok(())
    }

    /// Store a new record under `key`.
    ///
    /// Reserved fields in `entity` are dropped and reported in `issues`,
    /// unless `options.restore_record` is set, in which case they are kept.
    #[instrument(skip(self, entity, options), fields(partition = %key))]
    pub async fn insert(
        &self,
        key: &PartitionKey,
        id: Option<&str>,
        entity: Entity,
        options: &QueryOptions,
    ) -> Result<WriteAck, GatewayError> {
        key.validate()?;
        let mut record = entity;
        let mut issues = Vec::new();

        if !options.restore_record {
            for field in strip_fields(&mut record, RESERVED_FIELDS) {
                warn!(%field, "dropping reserved field on insert");
                issues.push(format!("reserved field '{field}' was ignored"));
            }
        }

        let owner = key
            .owner()
            .or_else(|| entity_owner(&record))
            .map(str::to_string)
            .ok_or_else(|| GatewayError::MissingOwner(key.to_string()))?;

        let id = match id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => entity_id(&record).map(str::to_string).unwrap_or_else(new_id),
        };

        let now = now_millis();
        if !record.contains_key(DATE_CREATED_FIELD) {
            record.insert(DATE_CREATED_FIELD.to_string(), json!(now));
        }
        if !record.contains_key(DATE_MODIFIED_FIELD) {
            record.insert(DATE_MODIFIED_FIELD.to_string(), json!(now));
        }
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        record.insert(OWNER_FIELD.to_string(), Value::String(owner.clone()));

        let key = key.with_owner(owner);
        let driver = self.driver_for(&key.app_name);
        driver.insert(&key, record.clone()).await?;
        debug!(driver = driver.name(), %id, "inserted");

        Ok(WriteAck {
            success: true,
            entity: record,
            issues,
        })
    }

    #[instrument(skip(self), fields(partition = %key))]
    pub async fn get_by_id(&self, key: &PartitionKey, id: &str) -> Result<Option<Entity>, GatewayError> {
        key.validate()?;
        if id.is_empty() {
            return Err(GatewayError::MissingRequiredField("id"));
        }
        self.driver_for(&key.app_name).get_by_id(key, id).await
    }

    /// Find records matching `id_or_query`. A bare string is an id lookup.
    #[instrument(skip(self, id_or_query, options), fields(partition = %key))]
    pub async fn find(
        &self,
        key: &PartitionKey,
        id_or_query: &Value,
        options: &QueryOptions,
    ) -> Result<Vec<Entity>, GatewayError> {
        key.validate()?;
        let query = normalize(id_or_query)?;

        if let Query::ById(id) = &query {
            let found = self.get_by_id(key, id).await?;
            return Ok(found
                .into_iter()
                .map(|entity| if options.key_only { key_only(&entity) } else { entity })
                .collect());
        }

        let spec = FindSpec::from_options(options, self.config.default_count);
        let driver = self.driver_for(&key.app_name);
        let found = driver.find(key, &query, &spec).await?;
        debug!(driver = driver.name(), count = found.len(), "find");
        Ok(found)
    }

    /// Patch matching records, or replace the first match wholesale when
    /// `options.replace_all_fields` is set.
    #[instrument(skip(self, id_or_query, patch, options), fields(partition = %key))]
    pub async fn update(
        &self,
        key: &PartitionKey,
        id_or_query: &Value,
        patch: Entity,
        options: &QueryOptions,
    ) -> Result<UpdateResult, GatewayError> {
        key.validate()?;
        let query = normalize(id_or_query)?;
        let driver = self.driver_for(&key.app_name);

        if options.replace_all_fields {
            let Some(prior) = self.first_match(driver, key, &query).await? else {
                return Ok(UpdateResult::default());
            };
            let (replaced, _) = self.replace_record(driver, key, &prior, patch).await?;
            return Ok(UpdateResult {
                n: replaced,
                n_modified: replaced,
            });
        }

        let mut patch = patch;
        strip_fields(&mut patch, IMMUTABLE_FIELDS);
        patch.insert(DATE_MODIFIED_FIELD.to_string(), json!(now_millis()));
        driver.patch(key, &query, &patch, options.multi).await
    }

    /// Replace the first match, or insert if there is none.
    ///
    /// A new record takes its id from `id_or_query` when that is a plain id.
    #[instrument(skip(self, id_or_query, entity), fields(partition = %key))]
    pub async fn upsert(
        &self,
        key: &PartitionKey,
        id_or_query: &Value,
        entity: Entity,
    ) -> Result<Entity, GatewayError> {
        key.validate()?;
        let query = normalize(id_or_query)?;
        let driver = self.driver_for(&key.app_name);

        match self.first_match(driver, key, &query).await? {
            Some(prior) => {
                let (_, record) = self.replace_record(driver, key, &prior, entity).await?;
                Ok(record)
            }
            None => {
                let ack = self
                    .insert(key, query.id_lookup(), entity, &QueryOptions::default())
                    .await?;
                Ok(ack.entity)
            }
        }
    }

    /// Delete the first match, or every match with `options.multi`.
    #[instrument(skip(self, id_or_query, options), fields(partition = %key))]
    pub async fn remove(
        &self,
        key: &PartitionKey,
        id_or_query: &Value,
        options: &QueryOptions,
    ) -> Result<RemoveResult, GatewayError> {
        key.validate()?;
        let query = normalize(id_or_query)?;
        let n = self
            .driver_for(&key.app_name)
            .remove(key, &query, options.multi)
            .await?;
        Ok(RemoveResult { n })
    }

    /// Collection names `app_name` has in its selected backend.
    #[instrument(skip(self))]
    pub async fn list_partition_names(&self, app_name: &str) -> Result<Vec<String>, GatewayError> {
        validate_app_name(app_name)?;
        self.driver_for(app_name).list_partition_names(app_name).await
    }

    async fn first_match(
        &self,
        driver: &Arc<dyn Driver>,
        key: &PartitionKey,
        query: &Query,
    ) -> Result<Option<Entity>, GatewayError> {
        if let Some(id) = query.id_lookup() {
            return driver.get_by_id(key, id).await;
        }
        Ok(driver
            .find(key, query, &FindSpec::first())
            .await?
            .into_iter()
            .next())
    }

    /// Overwrite `prior` with `body`, keeping its id, owner and creation
    /// date. Returns the replaced count and the stored record.
    async fn replace_record(
        &self,
        driver: &Arc<dyn Driver>,
        key: &PartitionKey,
        prior: &Entity,
        body: Entity,
    ) -> Result<(u64, Entity), GatewayError> {
        let id = entity_id(prior)
            .ok_or(GatewayError::MissingRequiredField("_id"))?
            .to_string();
        let owner = entity_owner(prior)
            .or(key.owner())
            .ok_or_else(|| GatewayError::MissingOwner(key.to_string()))?
            .to_string();
        let created = prior.get(DATE_CREATED_FIELD).cloned();

        let mut record = body;
        strip_fields(&mut record, IMMUTABLE_FIELDS);
        record.remove(DATE_MODIFIED_FIELD);

        let modified = created
            .as_ref()
            .and_then(Value::as_i64)
            .map_or(now_millis(), |created| now_millis().max(created));
        record.insert(ID_FIELD.to_string(), Value::String(id));
        record.insert(OWNER_FIELD.to_string(), Value::String(owner.clone()));
        if let Some(created) = created {
            record.insert(DATE_CREATED_FIELD.to_string(), created);
        }
        record.insert(DATE_MODIFIED_FIELD.to_string(), json!(modified));

        let replaced = driver.replace(&key.with_owner(owner), record.clone()).await?;
        Ok((replaced, record))
    }
}

impl Drop for DataStoreManager {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}

/// Periodically close idle connections on every driver.
fn spawn_reaper(drivers: Arc<DriverSet>, every: Duration, idle_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for driver in drivers.all() {
                let closed = driver.reap_idle(idle_timeout).await;
                if closed > 0 {
                    info!(driver = driver.name(), closed, "reaped idle connections");
                }
            }
        }
    })
}
