// SPDX-License-Identifier: PMPL-1.0-or-later
//! Typed query AST.
//!
//! A normalized query is either a direct id lookup or a flat conjunction of
//! clauses, at most one of which is a disjunction of single-field equalities.
//! Construct it through [`crate::normalize`]; the invariants are not
//! re-checked by consumers.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{json, Map, Value};

use crate::value::{compare_values, values_equal};
use crate::Entity;

/// Record identifier field, unique within a partition.
pub const ID_FIELD: &str = "_id";

/// Identity of the data subject owning a record.
pub const OWNER_FIELD: &str = "_owner";

/// Comparison operators allowed in range clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    /// Parse a `$lt`-style operator key.
    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$lt" => Some(RangeOp::Lt),
            "$lte" => Some(RangeOp::Lte),
            "$gt" => Some(RangeOp::Gt),
            "$gte" => Some(RangeOp::Gte),
            _ => None,
        }
    }

    /// The operator key as written in the query language.
    pub fn as_operator(self) -> &'static str {
        match self {
            RangeOp::Lt => "$lt",
            RangeOp::Lte => "$lte",
            RangeOp::Gt => "$gt",
            RangeOp::Gte => "$gte",
        }
    }

    /// Whether `field <op> operand` holds given `field.cmp(operand)`.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            RangeOp::Lt => ordering.is_lt(),
            RangeOp::Lte => ordering.is_le(),
            RangeOp::Gt => ordering.is_gt(),
            RangeOp::Gte => ordering.is_ge(),
        }
    }
}

/// `field == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equality {
    pub field: String,
    pub value: Value,
}

impl Equality {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        values_equal(entity.get(&self.field), &self.value)
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.field.clone(), self.value.clone());
        Value::Object(map)
    }
}

/// One element of the top-level conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Equals(Equality),
    Range {
        field: String,
        op: RangeOp,
        value: Value,
    },
    /// The single permitted disjunction; every branch is an equality.
    AnyOf(Vec<Equality>),
}

impl Clause {
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Clause::Equals(eq) => eq.matches(entity),
            Clause::Range { field, op, value } => entity
                .get(field)
                .and_then(|actual| compare_values(actual, value))
                .is_some_and(|ordering| op.accepts(ordering)),
            Clause::AnyOf(branches) => branches.iter().any(|b| b.matches(entity)),
        }
    }

    /// The constrained field, for single-field clauses.
    pub fn field(&self) -> Option<&str> {
        match self {
            Clause::Equals(eq) => Some(&eq.field),
            Clause::Range { field, .. } => Some(field),
            Clause::AnyOf(_) => None,
        }
    }

    /// Canonical query-language form of this clause.
    pub fn to_value(&self) -> Value {
        match self {
            Clause::Equals(eq) => eq.to_value(),
            Clause::Range { field, op, value } => {
                let mut operand = Map::new();
                operand.insert(op.as_operator().to_string(), value.clone());
                let mut map = Map::new();
                map.insert(field.clone(), Value::Object(operand));
                Value::Object(map)
            }
            Clause::AnyOf(branches) => {
                json!({ "$or": branches.iter().map(Equality::to_value).collect::<Vec<_>>() })
            }
        }
    }
}

/// A validated, normalized query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Direct lookup by `_id`.
    ById(String),
    /// Conjunction of clauses; empty matches every record in the partition.
    Where(Vec<Clause>),
}

impl Query {
    /// The query matching everything within a partition.
    pub fn all() -> Self {
        Query::Where(Vec::new())
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Query::ById(id.into())
    }

    /// The id being looked up, if this query is a bare id lookup.
    ///
    /// A conjunction consisting of a single string `_id` equality counts too.
    pub fn id_lookup(&self) -> Option<&str> {
        match self {
            Query::ById(id) => Some(id),
            Query::Where(clauses) => match clauses.as_slice() {
                [Clause::Equals(Equality {
                    field,
                    value: Value::String(id),
                })] if field == ID_FIELD => Some(id),
                _ => None,
            },
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        match self {
            Query::ById(_) => &[],
            Query::Where(clauses) => clauses,
        }
    }

    /// Branches of the disjunction, if the query has one.
    pub fn disjunction(&self) -> Option<&[Equality]> {
        self.clauses().iter().find_map(|clause| match clause {
            Clause::AnyOf(branches) => Some(branches.as_slice()),
            _ => None,
        })
    }

    /// Every clause other than the disjunction.
    pub fn conjuncts(&self) -> impl Iterator<Item = &Clause> {
        self.clauses()
            .iter()
            .filter(|clause| !matches!(clause, Clause::AnyOf(_)))
    }

    /// Owner named by a top-level string `_owner` equality.
    pub fn owner_constraint(&self) -> Option<&str> {
        self.conjuncts().find_map(|clause| match clause {
            Clause::Equals(Equality {
                field,
                value: Value::String(owner),
            }) if field == OWNER_FIELD => Some(owner.as_str()),
            _ => None,
        })
    }

    /// Evaluate the query against a record in-process.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Query::ById(id) => entity.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()),
            Query::Where(clauses) => clauses.iter().all(|clause| clause.matches(entity)),
        }
    }

    /// Canonical query-language form: a bare string or `{"$and": [...]}`.
    pub fn to_value(&self) -> Value {
        match self {
            Query::ById(id) => Value::String(id.clone()),
            Query::Where(clauses) => {
                json!({ "$and": clauses.iter().map(Clause::to_value).collect::<Vec<_>>() })
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(value: Value) -> Entity {
        match value {
            Value::Object(map) => map,
            _ => panic!("test entity must be an object"),
        }
    }

    #[test]
    fn test_range_op_round_trip() {
        for op in [RangeOp::Lt, RangeOp::Lte, RangeOp::Gt, RangeOp::Gte] {
            assert_eq!(RangeOp::from_operator(op.as_operator()), Some(op));
        }
        assert_eq!(RangeOp::from_operator("$eq"), None);
        assert!(RangeOp::Lte.accepts(Ordering::Equal));
        assert!(!RangeOp::Lt.accepts(Ordering::Equal));
    }

    #[test]
    fn test_matches_conjunction_and_disjunction() {
        let query = Query::Where(vec![
            Clause::Equals(Equality::new("allhave", json!("thisvalue"))),
            Clause::AnyOf(vec![
                Equality::new("tag", json!("tag1")),
                Equality::new("tag", json!("tag2")),
            ]),
            Clause::Range {
                field: "n".into(),
                op: RangeOp::Gte,
                value: json!(2),
            },
        ]);

        assert!(query.matches(&entity(json!({"allhave": "thisvalue", "tag": "tag2", "n": 2}))));
        assert!(!query.matches(&entity(json!({"allhave": "thisvalue", "tag": "tag3", "n": 5}))));
        assert!(!query.matches(&entity(json!({"allhave": "thisvalue", "tag": "tag1"}))));
        assert!(Query::all().matches(&entity(json!({}))));
    }

    #[test]
    fn test_id_lookup() {
        assert_eq!(Query::by_id("a").id_lookup(), Some("a"));
        let single = Query::Where(vec![Clause::Equals(Equality::new(ID_FIELD, json!("b")))]);
        assert_eq!(single.id_lookup(), Some("b"));
        let numeric = Query::Where(vec![Clause::Equals(Equality::new(ID_FIELD, json!(3)))]);
        assert_eq!(numeric.id_lookup(), None);
        assert_eq!(Query::all().id_lookup(), None);
    }

    #[test]
    fn test_owner_constraints() {
        let top = Query::Where(vec![Clause::Equals(Equality::new(OWNER_FIELD, json!("alice")))]);
        assert_eq!(top.owner_constraint(), Some("alice"));

        let branches = Query::Where(vec![Clause::AnyOf(vec![
            Equality::new(OWNER_FIELD, json!("alice")),
            Equality::new(OWNER_FIELD, json!("bob")),
        ])]);
        assert_eq!(branches.owner_constraint(), None);
        assert_eq!(Query::all().owner_constraint(), None);
    }

    #[test]
    fn test_canonical_form() {
        let query = Query::Where(vec![Clause::Range {
            field: "age".into(),
            op: RangeOp::Lt,
            value: json!(30),
        }]);
        assert_eq!(query.to_value(), json!({"$and": [{"age": {"$lt": 30}}]}));
        assert_eq!(Query::by_id("x").to_string(), "\"x\"");
    }
}
