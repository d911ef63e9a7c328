// SPDX-License-Identifier: PMPL-1.0-or-later
//! JSON value comparison shared by every driver that evaluates queries
//! in-process.
//!
//! Range comparison is only defined between two numbers or two strings.
//! Sorting needs a total order, so values of different JSON types are ranked
//! null < number < string < object < array < bool.

use std::cmp::Ordering;

use serde_json::{Number, Value};

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Integers compare exactly; only when either side is a float do both go
/// through `f64`.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return Some(x.cmp(&y));
    }
    match (x.as_i64(), y.as_u64(), x.as_u64(), y.as_i64()) {
        // A negative i64 against a u64 above i64::MAX.
        (Some(_), Some(_), _, _) => Some(Ordering::Less),
        (_, _, Some(_), Some(_)) => Some(Ordering::Greater),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

/// Compare two values for a range operator.
///
/// Returns `None` when the values are not comparable (different types, or
/// types without a natural order).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality as seen by queries: numbers compare numerically (`1 == 1.0`)
/// and a missing field equals `null`.
pub fn values_equal(field: Option<&Value>, expected: &Value) -> bool {
    match (field, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(x)), Value::Number(y)) => {
            compare_numbers(x, y).map_or(x == y, |o| o == Ordering::Equal)
        }
        (Some(actual), expected) => actual == expected,
    }
}

/// Total order over optional values, used for `sort`.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match type_rank(a).cmp(&type_rank(b)) {
        Ordering::Equal => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Array(x), Value::Array(y)) => x
                .iter()
                .zip(y.iter())
                .map(|(l, r)| sort_order(Some(l), Some(r)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| x.len().cmp(&y.len())),
            (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
            _ => compare_values(a, b).unwrap_or(Ordering::Equal),
        },
        other => other,
    }
}
