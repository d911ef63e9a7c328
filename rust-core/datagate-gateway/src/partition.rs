// SPDX-License-Identifier: PMPL-1.0-or-later
//! Partition keys and their physical names.
//!
//! Every record lives in exactly one logical partition, addressed by
//! `(app_name, collection_name, owner)`. How that maps to a physical
//! container depends on the backend:
//!
//! | Backend        | Physical container                                  |
//! |----------------|-----------------------------------------------------|
//! | document store | database `app` (or the unified db), collection `collection` (`app__collection` when unified) |
//! | kind store     | kind `app__collection__owner`                       |
//! | embedded       | namespace `app__collection`                         |
//!
//! `.` is not allowed in physical names and is mapped to `_`. The `__`
//! separator may not appear in a collection name, so a physical name always
//! splits back into its parts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Separator between the components of a composite physical name.
pub const NAME_SEPARATOR: &str = "__";

/// The logical address of a record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub app_name: String,
    pub collection_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl PartitionKey {
    pub fn new(
        app_name: impl Into<String>,
        collection_name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            collection_name: collection_name.into(),
            owner: Some(owner.into()),
        }
    }

    /// A key with no owner; only valid where the query supplies one.
    pub fn unowned(app_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            collection_name: collection_name.into(),
            owner: None,
        }
    }

    pub fn with_owner(&self, owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..self.clone()
        }
    }

    /// The owner, ignoring an empty string.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref().filter(|owner| !owner.is_empty())
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        validate_app_name(&self.app_name)?;
        if self.collection_name.is_empty() {
            return Err(GatewayError::MissingRequiredField("collection_name"));
        }
        check_segment("collection name", &self.collection_name)
    }
}

/// Reject app names that are empty or would make physical names ambiguous.
pub fn validate_app_name(app_name: &str) -> Result<(), GatewayError> {
    if app_name.is_empty() {
        return Err(GatewayError::MissingRequiredField("app_name"));
    }
    check_segment("app name", app_name)
}

/// A name segment may neither contain the separator nor end in `_`, which
/// would merge with the separator that follows it.
fn check_segment(what: &str, name: &str) -> Result<(), GatewayError> {
    let sanitized = sanitize(name);
    if sanitized.contains(NAME_SEPARATOR) || sanitized.ends_with('_') {
        return Err(GatewayError::InvalidPartition(format!(
            "{what} '{name}' may not contain '{NAME_SEPARATOR}' or end with '_'"
        )));
    }
    Ok(())
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.app_name,
            self.collection_name,
            self.owner().unwrap_or("*")
        )
    }
}

/// Which family of backend a physical name is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    DocumentStore,
    KindStore,
    Embedded,
}

/// Whether apps get their own document database or share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingMode {
    PerApp,
    Unified,
}

/// Map `.` to `_`.
pub fn sanitize(name: &str) -> String {
    name.replace('.', "_")
}

/// Physical container name for `key` on `backend`.
pub fn to_physical_name(
    key: &PartitionKey,
    backend: BackendKind,
    naming: NamingMode,
) -> Result<String, GatewayError> {
    key.validate()?;
    match backend {
        BackendKind::KindStore => {
            let owner = key
                .owner()
                .ok_or_else(|| GatewayError::MissingOwner(key.to_string()))?;
            Ok(kind_name(&key.app_name, &key.collection_name, owner))
        }
        BackendKind::DocumentStore => Ok(collection_name(key, naming)),
        BackendKind::Embedded => Ok(collection_name(key, NamingMode::Unified)),
    }
}

/// `app__collection__owner`.
pub fn kind_name(app_name: &str, collection_name: &str, owner: &str) -> String {
    [app_name, collection_name, owner]
        .iter()
        .map(|part| sanitize(part))
        .collect::<Vec<_>>()
        .join(NAME_SEPARATOR)
}

/// Collection name inside the database chosen by [`database_name`].
pub fn collection_name(key: &PartitionKey, naming: NamingMode) -> String {
    match naming {
        NamingMode::PerApp => sanitize(&key.collection_name),
        NamingMode::Unified => format!(
            "{}{}{}",
            sanitize(&key.app_name),
            NAME_SEPARATOR,
            sanitize(&key.collection_name)
        ),
    }
}

/// The document database an app's collections live in.
pub fn database_name(app_name: &str, unified_database: Option<&str>) -> String {
    sanitize(unified_database.unwrap_or(app_name))
}

/// Recover the collection name from a physical name belonging to `app_name`.
///
/// Returns `None` for names of other apps.
pub fn collection_from_physical(app_name: &str, physical: &str, backend: BackendKind) -> Option<String> {
    let prefix = format!("{}{}", sanitize(app_name), NAME_SEPARATOR);
    let rest = physical.strip_prefix(&prefix)?;
    let collection = match backend {
        BackendKind::KindStore => rest.split_once(NAME_SEPARATOR)?.0,
        BackendKind::DocumentStore | BackendKind::Embedded => rest,
    };
    (!collection.is_empty()).then(|| collection.to_string())
}
