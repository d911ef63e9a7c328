// SPDX-License-Identifier: PMPL-1.0-or-later
//! Datagate Query
//!
//! The restricted, portable query language accepted by the data-access
//! gateway. Raw JSON query terms are validated and normalized once into a
//! typed [`Query`] which every storage driver consumes.
//!
//! The grammar is deliberately small: a flat conjunction of single-field
//! equality or range clauses, with at most one disjunction of equalities.
//! Anything richer is rejected here, before a backend is ever selected.
//!
//! ```rust
//! use datagate_query::{normalize, Clause, Query};
//! use serde_json::json;
//!
//! let query = normalize(&json!({
//!     "$and": [
//!         {"allhave": "thisvalue"},
//!         {"$or": [{"tag": "tag2"}, {"tag": "tag1"}]}
//!     ]
//! }))
//! .unwrap();
//!
//! assert_eq!(query.disjunction().map(|branches| branches.len()), Some(2));
//! assert!(matches!(normalize(&json!("some-id")).unwrap(), Query::ById(_)));
//! assert!(normalize(&json!({"$nor": []})).is_err());
//! # let _ = Clause::AnyOf(Vec::new());
//! ```

pub mod ast;
pub mod error;
pub mod normalize;
pub mod options;
pub mod value;

pub use ast::{Clause, Equality, Query, RangeOp, ID_FIELD, OWNER_FIELD};
pub use error::QueryError;
pub use normalize::normalize;
pub use options::{QueryOptions, SortDirection, SortKey, SortSpec, DEFAULT_COUNT};

/// A stored record: an arbitrary JSON field map.
pub type Entity = serde_json::Map<String, serde_json::Value>;
