// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query validator and normalizer.
//!
//! Accepted shapes:
//!
//! - `null` matches everything in the partition.
//! - A string is an `_id` lookup.
//! - `{"$and": [clause, ...]}`, where `$and` is the only top-level key and
//!   every element holds exactly one key.
//! - Any other object is an implicit conjunction, one clause per key.
//!
//! A clause is `{field: scalar}`, `{field: {"$op": scalar}}`,
//! `{"$op": {field: scalar}}` (with `$op` one of `$eq $lt $lte $gt $gte`),
//! or `{"$or": [{field: scalar}, ...]}`. At most one `$or` per query.
//! The rules do not depend on which backend will run the query.

use serde_json::{Map, Value};

use crate::ast::{Clause, Equality, Query, RangeOp};
use crate::error::QueryError;

const AND: &str = "$and";
const OR: &str = "$or";
const EQ: &str = "$eq";

/// Validate a raw query term and produce its canonical form.
pub fn normalize(raw: &Value) -> Result<Query, QueryError> {
    match raw {
        Value::Null => Ok(Query::all()),
        Value::String(id) if id.is_empty() => Err(QueryError::malformed("empty id")),
        Value::String(id) => Ok(Query::ById(id.clone())),
        Value::Object(map) => normalize_object(map),
        other => Err(QueryError::malformed(format!(
            "expected an object, a string or null, found {}",
            type_name(other)
        ))),
    }
}

fn normalize_object(map: &Map<String, Value>) -> Result<Query, QueryError> {
    let clauses = match map.get(AND) {
        Some(and) => {
            if map.len() != 1 {
                return Err(QueryError::malformed("$and must be the only top-level key"));
            }
            let items = and
                .as_array()
                .ok_or_else(|| QueryError::malformed("$and must be an array"))?;
            items
                .iter()
                .map(|item| {
                    let element = item
                        .as_object()
                        .ok_or_else(|| QueryError::malformed("$and elements must be objects"))?;
                    let (key, value) = single_entry(element, "$and element")?;
                    parse_clause(key, value)
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        None => map
            .iter()
            .map(|(key, value)| parse_clause(key, value))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let disjunctions = clauses
        .iter()
        .filter(|clause| matches!(clause, Clause::AnyOf(_)))
        .count();
    if disjunctions > 1 {
        return Err(QueryError::MultipleDisjunctions(disjunctions));
    }

    Ok(Query::Where(clauses))
}

fn parse_clause(key: &str, value: &Value) -> Result<Clause, QueryError> {
    match key {
        OR => parse_disjunction(value).map(Clause::AnyOf),
        AND => Err(QueryError::malformed("nested $and is not allowed")),
        op if op.starts_with('$') => parse_operator_first(op, value),
        field => parse_field(field, value),
    }
}

/// `{field: scalar}` or `{field: {"$op": scalar}}`.
fn parse_field(field: &str, value: &Value) -> Result<Clause, QueryError> {
    check_field_name(field)?;
    match value {
        Value::Object(operator) => {
            let (op, operand) = single_entry(operator, "operator object")?;
            if !op.starts_with('$') {
                return Err(QueryError::malformed(format!(
                    "nested document under '{field}' is not allowed"
                )));
            }
            operator_clause(field, op, operand)
        }
        scalar => Ok(Clause::Equals(Equality::new(field, scalar.clone()))),
    }
}

/// `{"$op": {field: scalar}}`.
fn parse_operator_first(op: &str, value: &Value) -> Result<Clause, QueryError> {
    if op != EQ && RangeOp::from_operator(op).is_none() {
        return Err(QueryError::UnsupportedOperator(op.to_string()));
    }
    let inner = value
        .as_object()
        .ok_or_else(|| QueryError::malformed(format!("{op} expects a {{field: value}} object")))?;
    let (field, operand) = single_entry(inner, op)?;
    check_field_name(field)?;
    operator_clause(field, op, operand)
}

fn operator_clause(field: &str, op: &str, operand: &Value) -> Result<Clause, QueryError> {
    if operand.is_object() {
        return Err(QueryError::malformed(format!(
            "operand of {op} on '{field}' must not be an object"
        )));
    }
    if op == EQ {
        return Ok(Clause::Equals(Equality::new(field, operand.clone())));
    }
    match RangeOp::from_operator(op) {
        Some(range) => Ok(Clause::Range {
            field: field.to_string(),
            op: range,
            value: operand.clone(),
        }),
        None => Err(QueryError::UnsupportedOperator(op.to_string())),
    }
}

fn parse_disjunction(value: &Value) -> Result<Vec<Equality>, QueryError> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::malformed("$or must be an array"))?;
    if items.is_empty() {
        return Err(QueryError::malformed("$or must not be empty"));
    }
    items
        .iter()
        .map(|item| {
            let branch = item
                .as_object()
                .ok_or_else(|| QueryError::malformed("$or elements must be objects"))?;
            let (field, value) = single_entry(branch, "$or element")?;
            if field.starts_with('$') {
                return Err(QueryError::malformed(format!(
                    "$or elements must be field equalities, found {field}"
                )));
            }
            match parse_field(field, value)? {
                Clause::Equals(eq) => Ok(eq),
                _ => Err(QueryError::malformed(format!(
                    "$or branch on '{field}' must be an equality"
                ))),
            }
        })
        .collect()
}

fn single_entry<'a>(
    map: &'a Map<String, Value>,
    what: &str,
) -> Result<(&'a str, &'a Value), QueryError> {
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        (None, _) => Err(QueryError::malformed(format!("{what} must not be empty"))),
        (Some(_), Some(_)) => Err(QueryError::malformed(format!(
            "{what} must hold exactly one key, found {}",
            map.len()
        ))),
    }
}

fn check_field_name(field: &str) -> Result<(), QueryError> {
    if field.is_empty() {
        Err(QueryError::malformed("empty field name"))
    } else {
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
