// SPDX-License-Identifier: PMPL-1.0-or-later
//! Kind-store client abstraction.
//!
//! A kind store holds entities grouped by kind and answers property-filter
//! queries: a conjunction of equality and inequality filters with ordering,
//! offset and limit. It has no disjunction. `BackendKindStore` implements it
//! over any ordered key-value backend, with one namespace per kind plus a
//! catalog namespace recording every kind ever written.

use std::sync::Arc;

use async_trait::async_trait;
use datagate_query::value::{compare_values, values_equal};
use datagate_query::{Entity, RangeOp, SortSpec};
use datagate_storage::{InMemoryBackend, StorageBackend, StorageError, TypedStore};
use serde_json::Value;
use thiserror::Error;

use crate::entity::key_only;

/// Catalog namespace. Kind names always start with a non-empty app name, so
/// this cannot collide with one.
const KIND_CATALOG: &str = "__kinds";

#[derive(Error, Debug)]
pub enum KindStoreError {
    #[error("entity '{id}' already exists in kind '{kind}'")]
    AlreadyExists { kind: String, id: String },

    #[error("query on kind '{kind}' failed: {reason}")]
    QueryFailed { kind: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl From<RangeOp> for FilterOp {
    fn from(op: RangeOp) -> Self {
        match op {
            RangeOp::Lt => FilterOp::LessThan,
            RangeOp::Lte => FilterOp::LessThanOrEqual,
            RangeOp::Gt => FilterOp::GreaterThan,
            RangeOp::Gte => FilterOp::GreaterThanOrEqual,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub op: FilterOp,
    pub value: Value,
}

impl PropertyFilter {
    pub fn equal(property: impl Into<String>, value: Value) -> Self {
        Self {
            property: property.into(),
            op: FilterOp::Equal,
            value,
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        let actual = entity.get(&self.property);
        if self.op == FilterOp::Equal {
            return values_equal(actual, &self.value);
        }
        let Some(ordering) = actual.and_then(|a| compare_values(a, &self.value)) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => ordering.is_eq(),
            FilterOp::LessThan => ordering.is_lt(),
            FilterOp::LessThanOrEqual => ordering.is_le(),
            FilterOp::GreaterThan => ordering.is_gt(),
            FilterOp::GreaterThanOrEqual => ordering.is_ge(),
        }
    }
}

/// A single-kind query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindQuery {
    pub kind: String,
    pub filters: Vec<PropertyFilter>,
    pub order: SortSpec,
    pub limit: Option<usize>,
    pub offset: usize,
    pub keys_only: bool,
}

impl KindQuery {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: PropertyFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

#[async_trait]
pub trait KindStore: Send + Sync {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Entity>, KindStoreError>;

    /// Create an entity; fails with `AlreadyExists` if `id` is taken.
    async fn insert(&self, kind: &str, id: &str, entity: &Entity) -> Result<(), KindStoreError>;

    /// Create or overwrite an entity.
    async fn save(&self, kind: &str, id: &str, entity: &Entity) -> Result<(), KindStoreError>;

    async fn delete(&self, kind: &str, id: &str) -> Result<bool, KindStoreError>;

    async fn run_query(&self, query: &KindQuery) -> Result<Vec<Entity>, KindStoreError>;

    /// Every kind that has been written to.
    async fn list_kinds(&self) -> Result<Vec<String>, KindStoreError>;
}

/// A kind store over an ordered key-value backend.
#[derive(Clone)]
pub struct BackendKindStore {
    backend: Arc<dyn StorageBackend>,
}

impl BackendKindStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    fn entities(&self, kind: &str) -> TypedStore<Arc<dyn StorageBackend>> {
        TypedStore::new(Arc::clone(&self.backend), kind)
    }

    fn catalog(&self) -> TypedStore<Arc<dyn StorageBackend>> {
        TypedStore::new(Arc::clone(&self.backend), KIND_CATALOG)
    }
}

#[async_trait]
impl KindStore for BackendKindStore {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Entity>, KindStoreError> {
        Ok(self.entities(kind).get(id).await?)
    }

    async fn insert(&self, kind: &str, id: &str, entity: &Entity) -> Result<(), KindStoreError> {
        if !self.entities(kind).insert_new(id, entity).await? {
            return Err(KindStoreError::AlreadyExists {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        }
        self.catalog().put(kind, &true).await?;
        Ok(())
    }

    async fn save(&self, kind: &str, id: &str, entity: &Entity) -> Result<(), KindStoreError> {
        self.entities(kind).put(id, entity).await?;
        self.catalog().put(kind, &true).await?;
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<bool, KindStoreError> {
        Ok(self.entities(kind).delete(id).await?)
    }

    async fn run_query(&self, query: &KindQuery) -> Result<Vec<Entity>, KindStoreError> {
        let mut found: Vec<Entity> = self
            .entities(&query.kind)
            .entries::<Entity>()
            .await?
            .into_iter()
            .map(|(_, entity)| entity)
            .filter(|entity| query.filters.iter().all(|f| f.matches(entity)))
            .collect();

        query.order.sort(&mut found);
        let page = found
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX));
        Ok(if query.keys_only {
            page.map(|entity| key_only(&entity)).collect()
        } else {
            page.collect()
        })
    }

    async fn list_kinds(&self) -> Result<Vec<String>, KindStoreError> {
        Ok(self.catalog().keys().await?)
    }
}
