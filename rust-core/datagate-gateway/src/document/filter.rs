// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document-store filter language.
//!
//! The document store speaks a Mongo-style filter dialect: `$and`/`$or` at
//! the top, `field: value` for equality and `field: {"$op": value}` for
//! comparisons. The gateway's query language is a subset of it, so a
//! normalized query translates directly.

use std::cmp::Ordering;

use datagate_query::value::{compare_values, values_equal};
use datagate_query::{Clause, Entity, Equality, Query, ID_FIELD, OWNER_FIELD};
use serde_json::{json, Map, Value};

use super::DocumentStoreError;

/// Translate `query` into a native filter under the owner `scope`.
///
/// The scope is ANDed onto the whole filter, or onto each non-`_owner`
/// branch when the query has a disjunction.
pub fn to_native_filter(query: &Query, scope: Option<&str>) -> Value {
    let owner_term = |owner: &str| Equality::new(OWNER_FIELD, json!(owner)).to_value();

    let mut terms: Vec<Value> = match query {
        Query::ById(id) => vec![json!({ ID_FIELD: id })],
        Query::Where(_) => query.conjuncts().map(Clause::to_value).collect(),
    };
    match (query.disjunction(), scope) {
        (None, Some(owner)) => terms.push(owner_term(owner)),
        (None, None) => {}
        (Some(branches), _) => {
            let branches: Vec<Value> = branches
                .iter()
                .map(|branch| match scope {
                    Some(owner) if branch.field != OWNER_FIELD => {
                        json!({ "$and": [branch.to_value(), owner_term(owner)] })
                    }
                    _ => branch.to_value(),
                })
                .collect();
            terms.push(json!({ "$or": branches }));
        }
    }
    match terms.len() {
        0 => Value::Object(Map::new()),
        1 => terms.remove(0),
        _ => json!({ "$and": terms }),
    }
}

/// Evaluate a native filter against a stored document.
pub fn matches(document: &Entity, filter: &Value) -> Result<bool, DocumentStoreError> {
    let filter = filter
        .as_object()
        .ok_or_else(|| DocumentStoreError::InvalidFilter("filter must be an object".into()))?;

    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for term in terms(key, condition)? {
                    all &= matches(document, term)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for term in terms(key, condition)? {
                    any |= matches(document, term)?;
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(DocumentStoreError::InvalidFilter(format!(
                    "unknown top-level operator {op}"
                )))
            }
            field => field_matches(document.get(field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn terms<'a>(op: &str, condition: &'a Value) -> Result<&'a Vec<Value>, DocumentStoreError> {
    condition
        .as_array()
        .ok_or_else(|| DocumentStoreError::InvalidFilter(format!("{op} needs an array")))
}

fn is_operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    condition
        .as_object()
        .filter(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> Result<bool, DocumentStoreError> {
    let Some(operators) = is_operator_object(condition) else {
        return Ok(values_equal(actual, condition));
    };

    for (op, operand) in operators {
        let ordered = |accept: fn(Ordering) -> bool| {
            actual
                .and_then(|value| compare_values(value, operand))
                .is_some_and(accept)
        };
        let matched = match op.as_str() {
            "$eq" => values_equal(actual, operand),
            "$ne" => !values_equal(actual, operand),
            "$lt" => ordered(|o| o == Ordering::Less),
            "$lte" => ordered(|o| o != Ordering::Greater),
            "$gt" => ordered(|o| o == Ordering::Greater),
            "$gte" => ordered(|o| o != Ordering::Less),
            "$in" => terms(op, operand)?.iter().any(|v| values_equal(actual, v)),
            "$nin" => !terms(op, operand)?.iter().any(|v| values_equal(actual, v)),
            other => {
                return Err(DocumentStoreError::InvalidFilter(format!(
                    "unknown operator {other}"
                )))
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Apply a `{"$set": {...}}` update. Returns whether the document changed.
pub fn apply_update(document: &mut Entity, update: &Value) -> Result<bool, DocumentStoreError> {
    let update = update
        .as_object()
        .ok_or_else(|| DocumentStoreError::InvalidFilter("update must be an object".into()))?;

    let mut changed = false;
    for (op, fields) in update {
        match (op.as_str(), fields) {
            ("$set", Value::Object(fields)) => {
                for (field, value) in fields {
                    if document.get(field) != Some(value) {
                        document.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            ("$unset", Value::Object(fields)) => {
                for field in fields.keys() {
                    changed |= document.remove(field).is_some();
                }
            }
            (other, _) => {
                return Err(DocumentStoreError::InvalidFilter(format!(
                    "unsupported update {other}"
                )))
            }
        }
    }
    Ok(changed)
}
