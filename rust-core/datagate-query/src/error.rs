// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query validation errors.

use thiserror::Error;

/// Reasons a raw query term is rejected by the normalizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("malformed query: at most one $or clause is allowed, found {0}")]
    MultipleDisjunctions(usize),
}

impl QueryError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        QueryError::Malformed(reason.into())
    }
}
