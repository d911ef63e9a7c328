// SPDX-License-Identifier: PMPL-1.0-or-later
//! The storage driver seam.
//!
//! A driver executes normalized queries against one backend family. Drivers
//! receive records that already carry `_id`, `_owner` and timestamps; the
//! manager owns stamping, reserved-field handling and option defaults.

use std::time::Duration;

use async_trait::async_trait;
use datagate_query::{Entity, Query, QueryOptions, SortSpec, OWNER_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::key_only;
use crate::error::GatewayError;
use crate::partition::{BackendKind, PartitionKey};

/// Resolved find parameters.
///
/// `limit: None` means unbounded, which only internal callers use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub sort: SortSpec,
    pub limit: Option<usize>,
    pub skip: usize,
    pub key_only: bool,
}

impl FindSpec {
    pub fn from_options(options: &QueryOptions, default_count: usize) -> Self {
        Self {
            sort: options.sort.clone().unwrap_or_default(),
            limit: Some(options.effective_count(default_count)),
            skip: options.skip.unwrap_or(0),
            key_only: options.key_only,
        }
    }

    /// Every match, unsorted and unprojected.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// At most the first match.
    pub fn first() -> Self {
        Self {
            limit: Some(1),
            ..Self::default()
        }
    }

    /// `Some(1)` unless `multi`.
    pub fn for_write(multi: bool) -> Self {
        if multi {
            Self::unbounded()
        } else {
            Self::first()
        }
    }

    /// Sort, skip, limit and project an in-memory result set.
    pub fn apply(&self, mut entities: Vec<Entity>) -> Vec<Entity> {
        self.sort.sort(&mut entities);
        let page = entities
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX));
        if self.key_only {
            page.map(|entity| key_only(&entity)).collect()
        } else {
            page.collect()
        }
    }
}

/// `{n, nModified}` as reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub n: u64,
    pub n_modified: u64,
}

/// The owner scoping every part of `query` that is not an `_owner` branch
/// of its disjunction: a top-level `_owner` equality, else the key's owner.
///
/// An `_owner` branch selects that owner's records on its own; any other
/// branch, and a query without a disjunction, only sees records of the
/// scope owner. Every driver applies this rule.
pub fn scope_owner<'a>(key: &'a PartitionKey, query: &'a Query) -> Option<&'a str> {
    query.owner_constraint().or(key.owner())
}

/// Evaluate `query` in-process under the owner `scope`.
pub fn matches_in_scope(query: &Query, scope: Option<&str>, entity: &Entity) -> bool {
    let in_scope = scope.map_or(true, |owner| {
        entity.get(OWNER_FIELD).and_then(Value::as_str) == Some(owner)
    });
    match query {
        Query::ById(_) => in_scope && query.matches(entity),
        Query::Where(_) => {
            if !query.conjuncts().all(|clause| clause.matches(entity)) {
                return false;
            }
            match query.disjunction() {
                None => in_scope,
                Some(branches) => branches
                    .iter()
                    .any(|branch| branch.matches(entity) && (branch.field == OWNER_FIELD || in_scope)),
            }
        }
    }
}

/// A storage driver for one backend family.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Registry name of this driver.
    fn name(&self) -> &str;

    fn backend_kind(&self) -> BackendKind;

    /// Whether this driver serves `app_name`.
    fn supports_app(&self, app_name: &str) -> bool;

    /// Store a new record. Fails with `DuplicateId` if the id is taken.
    async fn insert(&self, key: &PartitionKey, entity: Entity) -> Result<(), GatewayError>;

    async fn get_by_id(&self, key: &PartitionKey, id: &str) -> Result<Option<Entity>, GatewayError>;

    async fn find(
        &self,
        key: &PartitionKey,
        query: &Query,
        spec: &FindSpec,
    ) -> Result<Vec<Entity>, GatewayError>;

    /// Overwrite the stored record with the same `_id`. Returns the number
    /// of records replaced.
    async fn replace(&self, key: &PartitionKey, entity: Entity) -> Result<u64, GatewayError>;

    /// Merge `patch` into the first match, or every match if `multi`.
    async fn patch(
        &self,
        key: &PartitionKey,
        query: &Query,
        patch: &Entity,
        multi: bool,
    ) -> Result<UpdateResult, GatewayError>;

    /// Delete the first match, or every match if `multi`.
    async fn remove(&self, key: &PartitionKey, query: &Query, multi: bool) -> Result<u64, GatewayError>;

    /// Collection names the app has in this backend.
    async fn list_partition_names(&self, app_name: &str) -> Result<Vec<String>, GatewayError>;

    /// Close connections idle for longer than `idle_timeout`, returning how
    /// many were closed.
    async fn reap_idle(&self, _idle_timeout: Duration) -> usize {
        0
    }

    async fn connection_count(&self) -> usize {
        0
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn entity(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    fn records() -> Vec<Entity> {
        (1..=5)
            .map(|i| entity(json!({"_id": format!("id{i}"), "rank": 6 - i})))
            .collect()
    }

    #[test]
    fn test_apply_sort_skip_limit() {
        let spec = FindSpec {
            sort: SortSpec::new().ascending("rank"),
            limit: Some(2),
            skip: 1,
            key_only: false,
        };
        let page = spec.apply(records());
        let ids: Vec<_> = page.iter().map(|e| e["_id"].clone()).collect();
        assert_eq!(ids, vec![json!("id4"), json!("id3")]);
    }

    #[test]
    fn test_apply_key_only() {
        let spec = FindSpec {
            key_only: true,
            ..FindSpec::first()
        };
        assert_eq!(spec.apply(records()), vec![entity(json!({"_id": "id1"}))]);
    }

    #[test]
    fn test_from_options() {
        let options = QueryOptions::default().with_skip(3).key_only();
        let spec = FindSpec::from_options(&options, 200);
        assert_eq!(spec.limit, Some(200));
        assert_eq!(spec.skip, 3);
        assert!(spec.key_only);
        assert_eq!(FindSpec::from_options(&options.with_count(7), 200).limit, Some(7));
    }

    #[test]
    fn test_for_write() {
        assert_eq!(FindSpec::for_write(false).limit, Some(1));
        assert_eq!(FindSpec::for_write(true).limit, None);
        assert_eq!(FindSpec::unbounded().apply(records()).len(), 5);
    }

    #[test]
    fn test_scope_owner_precedence() {
        let alice = PartitionKey::new("app", "notes", "alice");
        let top = datagate_query::normalize(&json!({"_owner": "bob", "n": 1})).unwrap();
        assert_eq!(scope_owner(&alice, &top), Some("bob"));
        let branches = datagate_query::normalize(&json!({"$or": [{"_owner": "bob"}, {"n": 1}]})).unwrap();
        assert_eq!(scope_owner(&alice, &branches), Some("alice"));
        assert_eq!(scope_owner(&PartitionKey::unowned("app", "notes"), &Query::all()), None);
    }

    #[test]
    fn test_non_owner_branches_stay_in_scope() {
        let query = datagate_query::normalize(&json!({"$or": [{"_owner": "bob"}, {"tag": "x"}]})).unwrap();
        let bobs = entity(json!({"_id": "b1", "_owner": "bob", "tag": "y"}));
        let carols = entity(json!({"_id": "c1", "_owner": "carol", "tag": "x"}));
        let alices = entity(json!({"_id": "a1", "_owner": "alice", "tag": "x"}));
        assert!(matches_in_scope(&query, Some("alice"), &bobs));
        assert!(!matches_in_scope(&query, Some("alice"), &carols));
        assert!(matches_in_scope(&query, Some("alice"), &alices));
        assert!(matches_in_scope(&query, None, &carols));
    }

    #[test]
    fn test_conflicting_owner_branch_never_matches() {
        let query =
            datagate_query::normalize(&json!({"_owner": "alice", "$or": [{"_owner": "bob"}]})).unwrap();
        let bobs = entity(json!({"_id": "b1", "_owner": "bob"}));
        assert!(!matches_in_scope(&query, Some("alice"), &bobs));
    }

    #[test]
    fn test_update_result_wire_names() {
        let result = UpdateResult { n: 2, n_modified: 1 };
        assert_eq!(serde_json::to_value(result).unwrap(), json!({"n": 2, "nModified": 1}));
    }
}
