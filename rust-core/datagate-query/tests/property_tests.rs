// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for the query normalizer

use datagate_query::{normalize, Clause, Query, QueryError};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Plain field names (never starting with `$`)
fn arb_field() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,12}"
}

/// Scalar operands
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn arb_range_op() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("$eq"), Just("$lt"), Just("$lte"), Just("$gt"), Just("$gte")]
}

/// A single well-formed non-disjunctive clause
fn arb_clause() -> impl Strategy<Value = Value> {
    prop_oneof![
        (arb_field(), arb_scalar()).prop_map(|(f, v)| json!({ f: v })),
        (arb_field(), arb_range_op(), arb_scalar()).prop_map(|(f, op, v)| {
            let mut inner = Map::new();
            inner.insert(op.to_string(), v);
            json!({ f: Value::Object(inner) })
        }),
    ]
}

fn arb_disjunction() -> impl Strategy<Value = Value> {
    prop::collection::vec((arb_field(), arb_scalar()), 1..5).prop_map(|branches| {
        let items: Vec<Value> = branches.into_iter().map(|(f, v)| json!({ f: v })).collect();
        json!({ "$or": items })
    })
}

fn arb_operator_name() -> impl Strategy<Value = String> {
    "\\$[a-z]{2,8}".prop_filter("must not be a supported operator", |op| {
        !matches!(
            op.as_str(),
            "$eq" | "$lt" | "$lte" | "$gt" | "$gte" | "$or" | "$and"
        )
    })
}

proptest! {
    #[test]
    fn test_well_formed_and_is_accepted(
        clauses in prop::collection::vec(arb_clause(), 0..6),
        disjunction in prop::option::of(arb_disjunction()),
    ) {
        let expected_len = clauses.len() + usize::from(disjunction.is_some());
        let mut items = clauses;
        if let Some(or) = disjunction {
            items.push(or);
        }
        let query = normalize(&json!({ "$and": items })).unwrap();
        prop_assert_eq!(query.clauses().len(), expected_len);
    }

    #[test]
    fn test_second_disjunction_is_rejected(
        first in arb_disjunction(),
        second in arb_disjunction(),
        clauses in prop::collection::vec(arb_clause(), 0..4),
    ) {
        let mut items = clauses;
        items.push(first);
        items.push(second);
        let result = normalize(&json!({ "$and": items }));
        prop_assert_eq!(result, Err(QueryError::MultipleDisjunctions(2)));
    }

    #[test]
    fn test_extra_top_level_key_beside_and_is_rejected(
        clauses in prop::collection::vec(arb_clause(), 0..4),
        field in arb_field(),
        value in arb_scalar(),
    ) {
        let mut raw = Map::new();
        raw.insert("$and".into(), Value::Array(clauses));
        raw.insert(field, value);
        prop_assert!(matches!(
            normalize(&Value::Object(raw)),
            Err(QueryError::Malformed(_))
        ));
    }

    #[test]
    fn test_multi_key_and_element_is_rejected(
        a in arb_field(),
        b in arb_field(),
        va in arb_scalar(),
        vb in arb_scalar(),
    ) {
        prop_assume!(a != b);
        let result = normalize(&json!({ "$and": [{ a: va, b: vb }] }));
        prop_assert!(result.is_err());
    }

    #[test]
    fn test_unknown_operator_is_rejected(
        field in arb_field(),
        op in arb_operator_name(),
        value in arb_scalar(),
    ) {
        let mut inner = Map::new();
        inner.insert(op.clone(), value);
        let result = normalize(&json!({ field: Value::Object(inner) }));
        prop_assert_eq!(result, Err(QueryError::UnsupportedOperator(op)));
    }

    #[test]
    fn test_normalize_is_deterministic_and_canonical(
        clauses in prop::collection::vec(arb_clause(), 0..6),
        disjunction in prop::option::of(arb_disjunction()),
    ) {
        let mut items = clauses;
        if let Some(or) = disjunction {
            items.push(or);
        }
        let raw = json!({ "$and": items });
        let first = normalize(&raw).unwrap();
        prop_assert_eq!(&first, &normalize(&raw).unwrap());
        // The canonical form normalizes back to the same query.
        prop_assert_eq!(&first, &normalize(&first.to_value()).unwrap());
    }

    #[test]
    fn test_string_is_id_lookup(id in "[a-zA-Z0-9]{1,24}") {
        prop_assert_eq!(normalize(&Value::String(id.clone())).unwrap(), Query::ById(id));
    }

    #[test]
    fn test_disjunction_branches_are_equalities(or in arb_disjunction()) {
        let query = normalize(&or).unwrap();
        prop_assert!(matches!(query.clauses(), [Clause::AnyOf(_)]));
    }
}
