// SPDX-License-Identifier: PMPL-1.0-or-later
//! Gateway error taxonomy.
//!
//! Validation and precondition errors are raised before any backend is
//! touched. Backend failures are wrapped once, with the operation and the
//! partition attached, and never retried or swallowed. "Not found" is not an
//! error: it is `Ok(None)` or an empty result.

use datagate_query::QueryError;
use datagate_storage::StorageError;
use thiserror::Error;

use crate::document::DocumentStoreError;
use crate::kind::KindStoreError;
use crate::partition::PartitionKey;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    MalformedQuery(#[from] QueryError),

    #[error("no owner resolvable for partition {0}")]
    MissingOwner(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    #[error("duplicate id '{id}' in {partition}")]
    DuplicateId { id: String, partition: String },

    #[error("expected at most one result for {context}, found {found}")]
    TooManyResults { context: String, found: usize },

    #[error("{operation} failed on {partition}: {source}")]
    Backend {
        operation: &'static str,
        partition: String,
        #[source]
        source: BackendError,
    },

    #[error("no driver registered under '{0}'")]
    UnknownDriver(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// Wrap a storage failure with call-site context.
    pub fn backend(
        operation: &'static str,
        key: &PartitionKey,
        source: impl Into<BackendError>,
    ) -> Self {
        GatewayError::Backend {
            operation,
            partition: key.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn duplicate(id: &str, key: &PartitionKey) -> Self {
        GatewayError::DuplicateId {
            id: id.to_string(),
            partition: key.to_string(),
        }
    }

    /// True for errors raised before a backend was reached.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GatewayError::MalformedQuery(_)
                | GatewayError::MissingOwner(_)
                | GatewayError::MissingRequiredField(_)
                | GatewayError::InvalidPartition(_)
        )
    }
}

/// The underlying storage failure inside [`GatewayError::Backend`].
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Document(#[from] DocumentStoreError),

    #[error(transparent)]
    Kind(#[from] KindStoreError),
}
