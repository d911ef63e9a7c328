// SPDX-License-Identifier: PMPL-1.0-or-later
//! Caller options accepted alongside a query.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value::sort_order;
use crate::{Entity, QueryError};

/// Result cap applied when a caller does not set `count`.
pub const DEFAULT_COUNT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Ordered sort keys, written `{"field": 1, "other": -1}` in the query
/// language. Key order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct SortSpec(Vec<SortKey>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.0.push(SortKey {
            field: field.into(),
            direction: SortDirection::Ascending,
        });
        self
    }

    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.0.push(SortKey {
            field: field.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare two records by every sort key in turn.
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        self.0
            .iter()
            .map(|key| {
                let ordering = sort_order(a.get(&key.field), b.get(&key.field));
                match key.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Stable in-place sort.
    pub fn sort(&self, entities: &mut [Entity]) {
        if !self.is_empty() {
            entities.sort_by(|a, b| self.compare(a, b));
        }
    }
}

impl TryFrom<Map<String, Value>> for SortSpec {
    type Error = QueryError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        map.into_iter()
            .map(|(field, direction)| {
                let direction = match direction.as_i64() {
                    Some(1) => SortDirection::Ascending,
                    Some(-1) => SortDirection::Descending,
                    _ => {
                        return Err(QueryError::Malformed(format!(
                            "sort direction for '{field}' must be 1 or -1"
                        )))
                    }
                };
                Ok(SortKey { field, direction })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SortSpec)
    }
}

impl From<SortSpec> for Map<String, Value> {
    fn from(spec: SortSpec) -> Self {
        spec.0
            .into_iter()
            .map(|key| {
                let direction = match key.direction {
                    SortDirection::Ascending => 1,
                    SortDirection::Descending => -1,
                };
                (key.field, Value::from(direction))
            })
            .collect()
    }
}

/// `{sort, count, skip, replaceAllFields, multi, keyOnly, restoreRecord}`.
///
/// Each operation reads only the options relevant to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptions {
    pub sort: Option<SortSpec>,
    pub count: Option<usize>,
    pub skip: Option<usize>,
    pub replace_all_fields: bool,
    pub multi: bool,
    pub key_only: bool,
    pub restore_record: bool,
}

impl QueryOptions {
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn replacing_all_fields(mut self) -> Self {
        self.replace_all_fields = true;
        self
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn key_only(mut self) -> Self {
        self.key_only = true;
        self
    }

    pub fn restoring_record(mut self) -> Self {
        self.restore_record = true;
        self
    }

    /// `count` if set, otherwise `default`.
    pub fn effective_count(&self, default: usize) -> usize {
        self.count.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_options_from_json() {
        let options: QueryOptions = serde_json::from_value(json!({
            "sort": {"tag": -1},
            "count": 2,
            "replaceAllFields": true,
            "keyOnly": true
        }))
        .unwrap();
        assert_eq!(options.sort, Some(SortSpec::new().descending("tag")));
        assert_eq!(options.count, Some(2));
        assert_eq!(options.skip, None);
        assert!(options.replace_all_fields);
        assert!(options.key_only);
        assert!(!options.multi);
        assert_eq!(options.effective_count(DEFAULT_COUNT), 2);
        assert_eq!(QueryOptions::default().effective_count(DEFAULT_COUNT), 200);
    }

    #[test]
    fn test_bad_sort_direction() {
        let result: Result<QueryOptions, _> = serde_json::from_value(json!({"sort": {"tag": 2}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_sort_multiple_keys() {
        let mut rows = vec![
            entity(json!({"tag": "b", "n": 1})),
            entity(json!({"tag": "a", "n": 2})),
            entity(json!({"tag": "b", "n": 3})),
            entity(json!({"n": 0})),
        ];
        SortSpec::new().ascending("tag").descending("n").sort(&mut rows);
        let order: Vec<i64> = rows.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_sort_spec_serializes_as_map() {
        let spec = SortSpec::new().ascending("a").descending("b");
        assert_eq!(serde_json::to_value(&spec).unwrap(), json!({"a": 1, "b": -1}));
    }
}
