use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::enums::{EntityKind, SyncStatus};

/// Who created and last modified a record, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Audit {
    /// Audit trail of a freshly created record: creation and last
    /// modification are the same event.
    pub fn created(actor: &str, at: DateTime<Utc>) -> Self {
        Self {
            created_by: Some(actor.to_string()),
            created_at: Some(at),
            modified_by: Some(actor.to_string()),
            modified_at: Some(at),
        }
    }

    /// Stamp a modification. Creation fields are never rewritten.
    pub fn touch(&mut self, actor: &str, at: DateTime<Utc>) {
        self.modified_by = Some(actor.to_string());
        self.modified_at = Some(at);
    }
}

/// One replicated row of any entity kind.
///
/// The business payload is opaque JSON; `range_key` and `scope_id` are the
/// two indexed keys the entity descriptor extracts from it. A tombstoned
/// record (`deleted == Some(true)`) always keeps the `sync_status` it had
/// before the deletion, so the reconciler can tell whether the record ever
/// reached the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: Uuid,
    pub kind: EntityKind,
    pub payload: Value,
    pub range_key: Option<String>,
    pub scope_id: Option<String>,
    pub sync_status: SyncStatus,
    pub deleted: Option<bool>,
    #[serde(flatten)]
    pub audit: Audit,
}

impl EntityRecord {
    pub fn is_tombstone(&self) -> bool {
        self.deleted == Some(true)
    }

    /// Whether the reconciler still has work to do for this record.
    pub fn needs_reconciliation(&self) -> bool {
        self.sync_status.is_pending() || self.is_tombstone()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Payload as sent over the wire: the business fields plus `id`.
    pub fn wire_payload(&self) -> Value {
        let mut object = match &self.payload {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("valor".into(), other.clone());
                map
            }
        };
        object.insert("id".into(), Value::String(self.id.to_string()));
        Value::Object(object)
    }
}

/// Apply a JSON merge patch: objects merge key by key, `null` removes a
/// key, anything else replaces the target.
pub fn merge_payload(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_payload(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}
