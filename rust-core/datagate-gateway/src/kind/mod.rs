// SPDX-License-Identifier: PMPL-1.0-or-later
//! Kind-store driver.
//!
//! Every `(app, collection, owner)` partition is its own kind, and the kind
//! store cannot express a disjunction. A find is therefore planned as one
//! single-kind query per disjunction branch:
//!
//! - a branch on `_owner` selects the kind to query;
//! - any other branch becomes an equality filter on the owner's kind;
//! - every remaining conjunct is added to every branch.
//!
//! Branches run concurrently. Their results are concatenated in branch order
//! and de-duplicated by `_id`, keeping the first occurrence. Sort, limit and
//! skip apply per branch, so a merged result can hold more than `limit`
//! records and is not globally ordered.

pub mod store;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use datagate_query::{Clause, Entity, Query, ID_FIELD, OWNER_FIELD};
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::driver::{scope_owner, Driver, FindSpec, UpdateResult};
use crate::entity::{entity_id, entity_owner, key_only, merge_patch};
use crate::error::GatewayError;
use crate::partition::{collection_from_physical, kind_name, BackendKind, PartitionKey};
use crate::selector::AppScope;

pub use store::{BackendKindStore, FilterOp, KindQuery, KindStore, KindStoreError, PropertyFilter};

/// Owner to query and the branch's own filter, if any.
type Branch<'a> = (Option<&'a str>, Option<PropertyFilter>);

pub struct KindStoreDriver {
    store: Arc<dyn KindStore>,
    scope: AppScope,
    name: String,
}

impl KindStoreDriver {
    pub fn new(store: Arc<dyn KindStore>) -> Self {
        Self {
            store,
            scope: AppScope::All,
            name: crate::selector::KIND_DRIVER.to_string(),
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

    /// Decompose `query` into one single-kind query per branch.
    ///
    /// Owner precedence per branch: the branch's own `_owner`, then a
    /// top-level `_owner` equality, then the key's owner. An `_owner` branch
    /// that contradicts the top-level `_owner` equality is dropped.
    pub fn plan(key: &PartitionKey, query: &Query, spec: &FindSpec) -> Result<Vec<KindQuery>, GatewayError> {
        key.validate()?;
        let top_owner = query.owner_constraint();
        let default_owner = scope_owner(key, query);

        let mut shared = Vec::new();
        for clause in query.conjuncts() {
            match clause {
                // Implied by the kind name.
                Clause::Equals(eq)
                    if eq.field == OWNER_FIELD && top_owner.is_some() && eq.value.as_str() == top_owner => {}
                Clause::Equals(eq) => shared.push(PropertyFilter::equal(&eq.field, eq.value.clone())),
                Clause::Range { field, op, value } => shared.push(PropertyFilter {
                    property: field.clone(),
                    op: (*op).into(),
                    value: value.clone(),
                }),
                Clause::AnyOf(_) => {}
            }
        }

        let mut branches: Vec<Branch<'_>> = Vec::new();
        match query.disjunction() {
            None => branches.push((default_owner, None)),
            Some(disjuncts) => {
                for branch in disjuncts {
                    if branch.field == OWNER_FIELD {
                        let owner = branch.value.as_str().ok_or_else(|| {
                            GatewayError::InvalidPartition(format!(
                                "{OWNER_FIELD} must be a string, got {}",
                                branch.value
                            ))
                        })?;
                        if top_owner.is_some_and(|top| top != owner) {
                            debug!(branch_owner = owner, "dropping contradictory owner branch");
                            continue;
                        }
                        branches.push((Some(owner), None));
                    } else {
                        let filter = PropertyFilter::equal(&branch.field, branch.value.clone());
                        branches.push((default_owner, Some(filter)));
                    }
                }
            }
        }

        let mut plans = Vec::with_capacity(branches.len());
        for (owner, branch_filter) in branches {
            let owner = owner
                .filter(|o| !o.is_empty())
                .ok_or_else(|| GatewayError::MissingOwner(key.to_string()))?;
            let mut filters: Vec<PropertyFilter> = branch_filter.into_iter().collect();
            filters.extend(shared.iter().cloned());
            plans.push(KindQuery {
                kind: kind_name(&key.app_name, &key.collection_name, owner),
                filters,
                order: spec.sort.clone(),
                limit: spec.limit,
                offset: spec.skip,
                keys_only: spec.key_only,
            });
        }
        Ok(plans)
    }

    fn kind_for(key: &PartitionKey) -> Result<String, GatewayError> {
        key.validate()?;
        let owner = key
            .owner()
            .ok_or_else(|| GatewayError::MissingOwner(key.to_string()))?;
        Ok(kind_name(&key.app_name, &key.collection_name, owner))
    }

    /// Every match with its kind, for writes that must address each record.
    async fn matches_with_kind(
        &self,
        key: &PartitionKey,
        query: &Query,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Entity)>, GatewayError> {
        let spec = FindSpec {
            limit,
            ..FindSpec::default()
        };
        let found = self.find(key, query, &spec).await?;
        let mut located = Vec::with_capacity(found.len());
        for entity in found.into_iter().take(limit.unwrap_or(usize::MAX)) {
            let kind = match entity_owner(&entity) {
                Some(owner) => kind_name(&key.app_name, &key.collection_name, owner),
                None => Self::kind_for(key)?,
            };
            located.push((kind, entity));
        }
        Ok(located)
    }
}

/// Concatenate branch results, keeping the first record seen for each `_id`.
pub fn merge_branches(results: Vec<Vec<Entity>>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .flatten()
        .filter(|entity| match entity_id(entity) {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .collect()
}

#[async_trait]
impl Driver for KindStoreDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::KindStore
    }

    fn supports_app(&self, app_name: &str) -> bool {
        self.scope.includes(app_name)
    }

    async fn insert(&self, key: &PartitionKey, entity: Entity) -> Result<(), GatewayError> {
        let kind = Self::kind_for(key)?;
        let id = entity_id(&entity)
            .ok_or(GatewayError::MissingRequiredField(ID_FIELD))?
            .to_string();
        self.store
            .insert(&kind, &id, &entity)
            .await
            .map_err(|e| match e {
                KindStoreError::AlreadyExists { id, .. } => GatewayError::duplicate(&id, key),
                other => GatewayError::backend("insert", key, other),
            })
    }

    async fn get_by_id(&self, key: &PartitionKey, id: &str) -> Result<Option<Entity>, GatewayError> {
        let kind = Self::kind_for(key)?;
        self.store
            .get(&kind, id)
            .await
            .map_err(|e| GatewayError::backend("get_by_id", key, e))
    }

    async fn find(
        &self,
        key: &PartitionKey,
        query: &Query,
        spec: &FindSpec,
    ) -> Result<Vec<Entity>, GatewayError> {
        if let Some(id) = query.id_lookup() {
            let found = self.get_by_id(key, id).await?;
            return Ok(found
                .into_iter()
                .map(|entity| if spec.key_only { key_only(&entity) } else { entity })
                .collect());
        }

        let plans = Self::plan(key, query, spec)?;
        debug!(partition = %key, branches = plans.len(), "kind store fan-out");

        let store = &self.store;
        let results = try_join_all(plans.iter().map(|plan| async move {
            store.run_query(plan).await.map_err(|e| {
                warn!(kind = %plan.kind, error = %e, "kind query branch failed");
                e
            })
        }))
        .await
        .map_err(|e| GatewayError::backend("find", key, e))?;

        Ok(merge_branches(results))
    }

    async fn replace(&self, key: &PartitionKey, entity: Entity) -> Result<u64, GatewayError> {
        let kind = match entity_owner(&entity) {
            Some(owner) => kind_name(&key.app_name, &key.collection_name, owner),
            None => Self::kind_for(key)?,
        };
        let id = entity_id(&entity)
            .ok_or(GatewayError::MissingRequiredField(ID_FIELD))?
            .to_string();
        let exists = self
            .store
            .get(&kind, &id)
            .await
            .map_err(|e| GatewayError::backend("replace", key, e))?
            .is_some();
        if !exists {
            return Ok(0);
        }
        self.store
            .save(&kind, &id, &entity)
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
        let limit = FindSpec::for_write(multi).limit;
        let mut result = UpdateResult::default();
        for (kind, mut entity) in self.matches_with_kind(key, query, limit).await? {
            result.n += 1;
            if !merge_patch(&mut entity, patch) {
                continue;
            }
            let id = entity_id(&entity)
                .ok_or(GatewayError::MissingRequiredField(ID_FIELD))?
                .to_string();
            self.store
                .save(&kind, &id, &entity)
                .await
                .map_err(|e| GatewayError::backend("update", key, e))?;
            result.n_modified += 1;
        }
        Ok(result)
    }

    async fn remove(&self, key: &PartitionKey, query: &Query, multi: bool) -> Result<u64, GatewayError> {
        let limit = FindSpec::for_write(multi).limit;
        let mut removed = 0;
        for (kind, entity) in self.matches_with_kind(key, query, limit).await? {
            let Some(id) = entity_id(&entity) else { continue };
            if self
                .store
                .delete(&kind, id)
                .await
                .map_err(|e| GatewayError::backend("remove", key, e))?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_partition_names(&self, app_name: &str) -> Result<Vec<String>, GatewayError> {
        let kinds = self.store.list_kinds().await.map_err(|e| {
            GatewayError::backend("list_partition_names", &PartitionKey::unowned(app_name, "*"), e)
        })?;
        let names: BTreeSet<String> = kinds
            .iter()
            .filter_map(|kind| collection_from_physical(app_name, kind, BackendKind::KindStore))
            .collect();
        Ok(names.into_iter().collect())
    }
}
