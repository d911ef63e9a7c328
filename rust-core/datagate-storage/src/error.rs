// SPDX-License-Identifier: PMPL-1.0-or-later
// Storage substrate errors.

use thiserror::Error;

/// Errors raised by a storage backend or the typed layer above it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The backend cannot be reached (file locked, task aborted, ...).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}
