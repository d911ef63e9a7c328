// SPDX-License-Identifier: PMPL-1.0-or-later
//! Gateway-managed record fields.

use datagate_query::{Entity, ID_FIELD, OWNER_FIELD};
use serde_json::Value;

pub const DATE_CREATED_FIELD: &str = "_date_Created";
pub const DATE_MODIFIED_FIELD: &str = "_date_Modified";
pub const ACCESSIBLE_FIELD: &str = "_accessible";

/// Fields a caller may not set on insert.
pub const RESERVED_FIELDS: &[&str] = &[
    ID_FIELD,
    OWNER_FIELD,
    DATE_CREATED_FIELD,
    DATE_MODIFIED_FIELD,
    ACCESSIBLE_FIELD,
];

/// Fields an update never changes.
pub const IMMUTABLE_FIELDS: &[&str] = &[ID_FIELD, OWNER_FIELD, DATE_CREATED_FIELD];

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A fresh record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn entity_id(entity: &Entity) -> Option<&str> {
    entity.get(ID_FIELD).and_then(Value::as_str)
}

pub fn entity_owner(entity: &Entity) -> Option<&str> {
    entity
        .get(OWNER_FIELD)
        .and_then(Value::as_str)
        .filter(|owner| !owner.is_empty())
}

/// Remove `fields` from `entity`, returning the names that were present.
pub fn strip_fields(entity: &mut Entity, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter(|field| entity.remove(**field).is_some())
        .map(|field| field.to_string())
        .collect()
}

/// The `{_id}` projection.
pub fn key_only(entity: &Entity) -> Entity {
    entity
        .get(ID_FIELD)
        .map(|id| {
            let mut projected = Entity::new();
            projected.insert(ID_FIELD.to_string(), id.clone());
            projected
        })
        .unwrap_or_default()
}

/// Shallow merge of `patch` into `target`. Returns whether anything changed.
pub fn merge_patch(target: &mut Entity, patch: &Entity) -> bool {
    let mut changed = false;
    for (field, value) in patch {
        if target.get(field) != Some(value) {
            target.insert(field.clone(), value.clone());
            changed = true;
        }
    }
    changed
}
