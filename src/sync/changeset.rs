//! Change-set tracking for grid-edited collections.
//!
//! The tracker owns the rows a grid shows and records, per row, whether it is
//! `new`, `modified` or `original`. Removed rows leave the visible collection
//! and, unless they were never submitted, leave their id behind in
//! `deleted_ids`. The resulting `ChangeSet` goes out as one batch call.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use super::descriptor::EntityDescriptor;
use super::orchestrator::WritePath;
use crate::models::*;

/// Row-level metadata carried with each tracked row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowState {
    New,
    Modified,
    Original,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRow {
    pub record: EntityRecord,
    pub state: RowState,
}

/// Three-way diff of a collection since it was loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub created: Vec<EntityRecord>,
    pub updated: Vec<EntityRecord>,
    pub deleted_ids: Vec<Uuid>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted_ids.is_empty()
    }

    /// `{created, updated, deletedIds}` as the batch mutations expect it.
    pub fn to_wire(&self) -> Value {
        json!({
            "created": self.created.iter().map(EntityRecord::wire_payload).collect::<Vec<_>>(),
            "updated": self.updated.iter().map(EntityRecord::wire_payload).collect::<Vec<_>>(),
            "deletedIds": self.deleted_ids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedAction {
    Edit,
    Delete,
}

impl std::fmt::Display for GuardedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "edited"),
            Self::Delete => write!(f, "deleted"),
        }
    }
}

/// A row operation the tracker refused. Messages are shown to the user.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RowRejection {
    #[error("Row {0} is not part of this collection")]
    UnknownRow(Uuid),

    #[error("This {kind} has {count} recorded attendee(s) and cannot be {action}")]
    Protected {
        kind: EntityKind,
        count: u32,
        action: GuardedAction,
    },

    #[error("Deletion was not confirmed")]
    NotConfirmed,
}

impl From<RowRejection> for Envelope {
    fn from(rejection: RowRejection) -> Self {
        Envelope::failure(rejection.to_string())
    }
}

/// Accumulates per-row dirty state for one editable collection.
#[derive(Debug, Clone)]
pub struct ChangeSetTracker {
    descriptor: &'static EntityDescriptor,
    rows: Vec<TrackedRow>,
    deleted_ids: Vec<Uuid>,
}

impl ChangeSetTracker {
    /// Start tracking a freshly loaded collection; every row is `original`.
    pub fn new(descriptor: &'static EntityDescriptor, loaded: Vec<EntityRecord>) -> Self {
        let rows = loaded
            .into_iter()
            .map(|record| TrackedRow {
                record,
                state: RowState::Original,
            })
            .collect();
        Self {
            descriptor,
            rows,
            deleted_ids: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    /// Visible rows, in display order.
    pub fn rows(&self) -> &[TrackedRow] {
        &self.rows
    }

    /// Append a new row built from `payload`; returns its client-side id.
    pub fn add(&mut self, payload: Value, actor: &str) -> Uuid {
        let id = Uuid::new_v4();
        let record = self
            .descriptor
            .new_record(id, payload, SyncStatus::PendingCreate, actor, Utc::now());
        self.rows.push(TrackedRow {
            record,
            state: RowState::New,
        });
        id
    }

    /// Merge `patch` into a row. `original` rows become `modified`; `new`
    /// rows stay `new`.
    pub fn edit(&mut self, id: &Uuid, patch: &Value, actor: &str) -> Result<(), RowRejection> {
        let descriptor = self.descriptor;
        let row = self
            .rows
            .iter_mut()
            .find(|r| &r.record.id == id)
            .ok_or(RowRejection::UnknownRow(*id))?;

        let count = descriptor.protected_count(&row.record.payload);
        if count > 0 {
            return Err(RowRejection::Protected {
                kind: descriptor.kind,
                count,
                action: GuardedAction::Edit,
            });
        }

        merge_payload(&mut row.record.payload, patch);
        let (range_key, scope_id) = descriptor.index_keys(&row.record.payload);
        row.record.range_key = range_key;
        row.record.scope_id = scope_id;
        row.record.audit.touch(actor, Utc::now());
        if row.state == RowState::Original {
            row.state = RowState::Modified;
        }
        Ok(())
    }

    /// Remove a row after `confirm` approves it. Protected rows are refused
    /// before the user is asked.
    pub fn remove<F>(&mut self, id: &Uuid, confirm: F) -> Result<(), RowRejection>
    where
        F: FnOnce(&EntityRecord) -> bool,
    {
        let index = self
            .rows
            .iter()
            .position(|r| &r.record.id == id)
            .ok_or(RowRejection::UnknownRow(*id))?;

        let row = &self.rows[index];
        let count = self.descriptor.protected_count(&row.record.payload);
        if count > 0 {
            return Err(RowRejection::Protected {
                kind: self.descriptor.kind,
                count,
                action: GuardedAction::Delete,
            });
        }
        if !confirm(&row.record) {
            return Err(RowRejection::NotConfirmed);
        }

        let removed = self.rows.remove(index);
        if removed.state != RowState::New && !self.deleted_ids.contains(id) {
            self.deleted_ids.push(*id);
        }
        Ok(())
    }

    /// Current diff. Pure: calling it twice without edits yields equal sets.
    pub fn change_set(&self) -> ChangeSet {
        let pick = |state: RowState| {
            self.rows
                .iter()
                .filter(|r| r.state == state)
                .map(|r| r.record.clone())
                .collect::<Vec<_>>()
        };
        ChangeSet {
            created: pick(RowState::New),
            updated: pick(RowState::Modified),
            deleted_ids: self.deleted_ids.clone(),
        }
    }

    /// Forget pending deletions and mark modified rows original again.
    /// New rows are left as they are, and removed rows are not restored.
    pub fn reset(&mut self) {
        self.deleted_ids.clear();
        for row in &mut self.rows {
            if row.state == RowState::Modified {
                row.state = RowState::Original;
            }
        }
    }

    /// Settle the tracker after a submit. Only a change set the remote took
    /// (`WritePath::Remote`) marks everything original and synced; any other
    /// path leaves the rows as they are and returns `false`.
    pub fn commit(&mut self, path: WritePath) -> bool {
        if path != WritePath::Remote {
            return false;
        }
        self.deleted_ids.clear();
        for row in &mut self.rows {
            row.state = RowState::Original;
            row.record.sync_status = SyncStatus::Synced;
        }
        true
    }
}
