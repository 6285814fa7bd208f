//! Local replica store, one logical store per entity kind.
//!
//! Every table has the same shape, so a single implementation serves all five
//! kinds; the kind selects the table. `LocalStore` is the surface the sync
//! orchestrator and the UI read path use. `PendingLedger` is the narrower
//! surface the reconciler consumes to find and close out pending records.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::DatabaseError;
use crate::models::*;

/// Base replica operations, per entity kind.
pub trait LocalStore: Send + Sync {
    fn get_by_id(&self, kind: EntityKind, id: &Uuid) -> Result<Option<EntityRecord>, DatabaseError>;

    /// Live records whose `range_key` lies in `[from, to]`, optionally
    /// restricted to one scope. Tombstones are excluded.
    fn get_by_range(
        &self,
        kind: EntityKind,
        from: &str,
        to: &str,
        scope_id: Option<&str>,
    ) -> Result<Vec<EntityRecord>, DatabaseError>;

    fn create(&self, record: &EntityRecord) -> Result<(), DatabaseError>;

    fn update(
        &self,
        kind: EntityKind,
        id: &Uuid,
        patch: &RecordPatch,
    ) -> Result<EntityRecord, DatabaseError>;

    /// `soft = true` sets the tombstone and keeps the row; `soft = false`
    /// removes it and is only used once the remote accepted the deletion.
    fn delete(&self, kind: EntityKind, id: &Uuid, soft: bool) -> Result<(), DatabaseError>;
}

/// Surface the reconciliation service needs to close out pending records.
pub trait PendingLedger: Send + Sync {
    /// Records with `sync_status != synced` or a tombstone, not yet hard-deleted.
    fn list_pending(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, DatabaseError>;

    fn mark_synced(&self, kind: EntityKind, id: &Uuid) -> Result<(), DatabaseError>;

    /// Hard-delete a tombstone whose deletion is settled.
    fn mark_deleted(&self, kind: EntityKind, id: &Uuid) -> Result<(), DatabaseError>;
}

/// How an update rewrites the stored payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadPatch {
    /// JSON merge patch over the stored payload.
    Merge(Value),
    /// Replace the stored payload wholesale.
    Replace(Value),
}

/// Partial update of a replica record. `None` fields are left untouched;
/// `Some(None)` clears an index key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub payload: Option<PayloadPatch>,
    pub range_key: Option<Option<String>>,
    pub scope_id: Option<Option<String>>,
    pub sync_status: Option<SyncStatus>,
    pub modified_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn status(sync_status: SyncStatus) -> Self {
        Self {
            sync_status: Some(sync_status),
            ..Default::default()
        }
    }

    fn apply(&self, record: &mut EntityRecord) {
        match &self.payload {
            Some(PayloadPatch::Merge(patch)) => merge_payload(&mut record.payload, patch),
            Some(PayloadPatch::Replace(payload)) => record.payload = payload.clone(),
            None => {}
        }
        if let Some(range_key) = &self.range_key {
            record.range_key = range_key.clone();
        }
        if let Some(scope_id) = &self.scope_id {
            record.scope_id = scope_id.clone();
        }
        if let Some(status) = self.sync_status {
            record.sync_status = status;
        }
        if let Some(by) = &self.modified_by {
            record.audit.modified_by = Some(by.clone());
        }
        if let Some(at) = self.modified_at {
            record.audit.modified_at = Some(at);
        }
    }
}

/// Pending record counts per entity kind, for a status display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub activities: usize,
    pub sessions: usize,
    pub attendance: usize,
    pub beneficiaries: usize,
    pub exceptions: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.activities + self.sessions + self.attendance + self.beneficiaries + self.exceptions
    }

    fn slot(&mut self, kind: EntityKind) -> &mut usize {
        match kind {
            EntityKind::Activity => &mut self.activities,
            EntityKind::Session => &mut self.sessions,
            EntityKind::Attendance => &mut self.attendance,
            EntityKind::Beneficiary => &mut self.beneficiaries,
            EntityKind::Exception => &mut self.exceptions,
        }
    }
}

// ═══════════════════════════════════════════
// SQLite-backed replica
// ═══════════════════════════════════════════

const RECORD_COLUMNS: &str = "id, payload, range_key, scope_id, sync_status, deleted,
     created_by, created_at, modified_by, modified_at";

/// Replica backed by one SQLite connection. The lock is held for a single
/// statement (or read-modify-write) and never across an await point.
pub struct ReplicaStore {
    conn: Mutex<Connection>,
}

impl ReplicaStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// In-memory replica with migrations applied (for testing).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(super::open_memory_database()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn pending_counts(&self) -> Result<PendingCounts, DatabaseError> {
        let conn = self.lock()?;
        let mut counts = PendingCounts::default();
        for kind in EntityKind::ALL {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE sync_status != 'synced' OR deleted = 1",
                    kind.table()
                ),
                [],
                |row| row.get(0),
            )?;
            *counts.slot(kind) = count as usize;
        }
        Ok(counts)
    }
}

fn select_by_id(
    conn: &Connection,
    kind: EntityKind,
    id: &Uuid,
) -> Result<Option<EntityRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM {} WHERE id = ?1", kind.table()),
            params![id.to_string()],
            read_record_row,
        )
        .optional()?;
    row.map(|r| record_from_row(kind, r)).transpose()
}

fn write_record(conn: &Connection, record: &EntityRecord) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO {} ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            record.kind.table()
        ),
        params![
            record.id.to_string(),
            serde_json::to_string(&record.payload)?,
            record.range_key,
            record.scope_id,
            record.sync_status.as_str(),
            record.deleted.map(|d| d as i32),
            record.audit.created_by,
            record.audit.created_at.map(|t| t.to_rfc3339()),
            record.audit.modified_by,
            record.audit.modified_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn not_found(kind: EntityKind, id: &Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: kind.as_str().to_string(),
        id: id.to_string(),
    }
}

impl LocalStore for ReplicaStore {
    fn get_by_id(&self, kind: EntityKind, id: &Uuid) -> Result<Option<EntityRecord>, DatabaseError> {
        let conn = self.lock()?;
        select_by_id(&conn, kind, id)
    }

    fn get_by_range(
        &self,
        kind: EntityKind,
        from: &str,
        to: &str,
        scope_id: Option<&str>,
    ) -> Result<Vec<EntityRecord>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM {}
             WHERE range_key BETWEEN ?1 AND ?2
               AND (?3 IS NULL OR scope_id = ?3)
               AND (deleted IS NULL OR deleted = 0)
             ORDER BY range_key ASC, id ASC",
            kind.table()
        ))?;
        let rows = stmt.query_map(params![from, to, scope_id], read_record_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(record_from_row(kind, row?)?);
        }
        Ok(records)
    }

    fn create(&self, record: &EntityRecord) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        write_record(&conn, record).map_err(|e| match e {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DatabaseError::ConstraintViolation(format!(
                    "{} {} already exists in the replica",
                    record.kind, record.id
                ))
            }
            other => other,
        })
    }

    fn update(
        &self,
        kind: EntityKind,
        id: &Uuid,
        patch: &RecordPatch,
    ) -> Result<EntityRecord, DatabaseError> {
        let conn = self.lock()?;
        let mut record = select_by_id(&conn, kind, id)?.ok_or_else(|| not_found(kind, id))?;
        patch.apply(&mut record);

        conn.execute(
            &format!(
                "UPDATE {} SET payload = ?2, range_key = ?3, scope_id = ?4, sync_status = ?5,
                 modified_by = ?6, modified_at = ?7
                 WHERE id = ?1",
                kind.table()
            ),
            params![
                id.to_string(),
                serde_json::to_string(&record.payload)?,
                record.range_key,
                record.scope_id,
                record.sync_status.as_str(),
                record.audit.modified_by,
                record.audit.modified_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(record)
    }

    fn delete(&self, kind: EntityKind, id: &Uuid, soft: bool) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        if soft {
            let changed = conn.execute(
                &format!("UPDATE {} SET deleted = 1 WHERE id = ?1", kind.table()),
                params![id.to_string()],
            )?;
            if changed == 0 {
                return Err(not_found(kind, id));
            }
        } else {
            // Hard deletes follow a remote-confirmed deletion; a row that was
            // never mirrored locally has nothing left to remove.
            conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
                params![id.to_string()],
            )?;
        }
        Ok(())
    }
}

impl PendingLedger for ReplicaStore {
    fn list_pending(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM {}
             WHERE sync_status != 'synced' OR deleted = 1
             ORDER BY modified_at ASC, id ASC",
            kind.table()
        ))?;
        let rows = stmt.query_map([], read_record_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(record_from_row(kind, row?)?);
        }
        Ok(records)
    }

    fn mark_synced(&self, kind: EntityKind, id: &Uuid) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            &format!("UPDATE {} SET sync_status = 'synced' WHERE id = ?1", kind.table()),
            params![id.to_string()],
        )?;
        if changed == 0 {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    fn mark_deleted(&self, kind: EntityKind, id: &Uuid) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
            params![id.to_string()],
        )?;
        if changed == 0 {
            return Err(not_found(kind, id));
        }
        Ok(())
    }
}

// Internal row type for record mapping
struct RecordRow {
    id: String,
    payload: String,
    range_key: Option<String>,
    scope_id: Option<String>,
    sync_status: String,
    deleted: Option<i32>,
    created_by: Option<String>,
    created_at: Option<String>,
    modified_by: Option<String>,
    modified_at: Option<String>,
}

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        payload: row.get(1)?,
        range_key: row.get(2)?,
        scope_id: row.get(3)?,
        sync_status: row.get(4)?,
        deleted: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
        modified_by: row.get(8)?,
        modified_at: row.get(9)?,
    })
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn record_from_row(kind: EntityKind, row: RecordRow) -> Result<EntityRecord, DatabaseError> {
    Ok(EntityRecord {
        id: Uuid::parse_str(&row.id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        kind,
        payload: serde_json::from_str(&row.payload)?,
        range_key: row.range_key,
        scope_id: row.scope_id,
        sync_status: SyncStatus::from_str(&row.sync_status)?,
        deleted: row.deleted.map(|d| d != 0),
        audit: Audit {
            created_by: row.created_by,
            created_at: parse_timestamp(row.created_at),
            modified_by: row.modified_by,
            modified_at: parse_timestamp(row.modified_at),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> ReplicaStore {
        ReplicaStore::in_memory().unwrap()
    }

    fn make_record(kind: EntityKind, range_key: &str, scope: &str, status: SyncStatus) -> EntityRecord {
        EntityRecord {
            id: Uuid::new_v4(),
            kind,
            payload: json!({"fecha": range_key, "actividadId": scope, "hora": "10:00"}),
            range_key: Some(range_key.into()),
            scope_id: Some(scope.into()),
            sync_status: status,
            deleted: None,
            audit: Audit::created("ana", Utc::now()),
        }
    }

    #[test]
    fn create_and_get_by_id() {
        let store = test_store();
        let rec = make_record(EntityKind::Session, "2024-05-01", "act-1", SyncStatus::Synced);
        store.create(&rec).unwrap();

        let back = store.get_by_id(EntityKind::Session, &rec.id).unwrap().unwrap();
        assert_eq!(back.payload, rec.payload);
        assert_eq!(back.sync_status, SyncStatus::Synced);
        assert_eq!(back.deleted, None);
        assert_eq!(back.audit.created_by.as_deref(), Some("ana"));
    }

    #[test]
    fn kinds_are_isolated() {
        let store = test_store();
        let rec = make_record(EntityKind::Session, "2024-05-01", "act-1", SyncStatus::Synced);
        store.create(&rec).unwrap();
        assert!(store.get_by_id(EntityKind::Exception, &rec.id).unwrap().is_none());
    }

    #[test]
    fn duplicate_create_is_constraint_violation() {
        let store = test_store();
        let rec = make_record(EntityKind::Activity, "2024-05-01", "sede-1", SyncStatus::Synced);
        store.create(&rec).unwrap();
        let err = store.create(&rec).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn range_query_filters_scope_and_tombstones() {
        let store = test_store();
        let in_range = make_record(EntityKind::Session, "2024-05-02", "act-1", SyncStatus::Synced);
        let other_scope = make_record(EntityKind::Session, "2024-05-02", "act-2", SyncStatus::Synced);
        let out_of_range = make_record(EntityKind::Session, "2024-06-10", "act-1", SyncStatus::Synced);
        let tombstoned = make_record(EntityKind::Session, "2024-05-03", "act-1", SyncStatus::Synced);
        for rec in [&in_range, &other_scope, &out_of_range, &tombstoned] {
            store.create(rec).unwrap();
        }
        store.delete(EntityKind::Session, &tombstoned.id, true).unwrap();

        let found = store
            .get_by_range(EntityKind::Session, "2024-05-01", "2024-05-31", Some("act-1"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, in_range.id);

        let any_scope = store
            .get_by_range(EntityKind::Session, "2024-05-01", "2024-05-31", None)
            .unwrap();
        assert_eq!(any_scope.len(), 2);
    }

    #[test]
    fn update_merges_payload_and_keeps_creation_audit() {
        let store = test_store();
        let rec = make_record(EntityKind::Session, "2024-05-01", "act-1", SyncStatus::Synced);
        store.create(&rec).unwrap();

        let updated = store
            .update(
                EntityKind::Session,
                &rec.id,
                &RecordPatch {
                    payload: Some(PayloadPatch::Merge(json!({"hora": "12:00"}))),
                    sync_status: Some(SyncStatus::PendingUpdate),
                    modified_by: Some("luis".into()),
                    modified_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.payload["hora"], "12:00");
        assert_eq!(updated.payload["fecha"], "2024-05-01");
        assert_eq!(updated.sync_status, SyncStatus::PendingUpdate);

        let back = store.get_by_id(EntityKind::Session, &rec.id).unwrap().unwrap();
        assert_eq!(back, updated);
        assert_eq!(back.audit.created_by.as_deref(), Some("ana"));
        assert_eq!(back.audit.modified_by.as_deref(), Some("luis"));
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let store = test_store();
        let err = store
            .update(EntityKind::Session, &Uuid::new_v4(), &RecordPatch::status(SyncStatus::Synced))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn replace_payload_drops_old_fields() {
        let store = test_store();
        let rec = make_record(EntityKind::Exception, "2024-05-01", "act-1", SyncStatus::Synced);
        store.create(&rec).unwrap();
        let updated = store
            .update(
                EntityKind::Exception,
                &rec.id,
                &RecordPatch {
                    payload: Some(PayloadPatch::Replace(json!({"motivo": "feriado"}))),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.payload, json!({"motivo": "feriado"}));
    }

    #[test]
    fn patch_can_clear_index_keys() {
        let store = test_store();
        let rec = make_record(EntityKind::Session, "2024-05-01", "act-1", SyncStatus::Synced);
        store.create(&rec).unwrap();

        let untouched = store
            .update(EntityKind::Session, &rec.id, &RecordPatch::status(SyncStatus::PendingUpdate))
            .unwrap();
        assert_eq!(untouched.range_key.as_deref(), Some("2024-05-01"));

        let cleared = store
            .update(
                EntityKind::Session,
                &rec.id,
                &RecordPatch {
                    range_key: Some(None),
                    scope_id: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.range_key, None);
        assert_eq!(cleared.scope_id, None);
        assert!(store
            .get_by_range(EntityKind::Session, "2024-01-01", "2024-12-31", None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn soft_delete_keeps_record_and_status() {
        let store = test_store();
        let rec = make_record(EntityKind::Beneficiary, "2024-05-01", "sede-1", SyncStatus::PendingUpdate);
        store.create(&rec).unwrap();
        store.delete(EntityKind::Beneficiary, &rec.id, true).unwrap();

        let back = store.get_by_id(EntityKind::Beneficiary, &rec.id).unwrap().unwrap();
        assert_eq!(back.deleted, Some(true));
        assert_eq!(back.sync_status, SyncStatus::PendingUpdate);
    }

    #[test]
    fn soft_delete_of_missing_record_is_not_found() {
        let store = test_store();
        let err = store.delete(EntityKind::Beneficiary, &Uuid::new_v4(), true).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn hard_delete_removes_record() {
        let store = test_store();
        let rec = make_record(EntityKind::Exception, "2024-05-01", "act-1", SyncStatus::Synced);
        store.create(&rec).unwrap();
        store.delete(EntityKind::Exception, &rec.id, false).unwrap();
        assert!(store.get_by_id(EntityKind::Exception, &rec.id).unwrap().is_none());
        // Absent rows are fine for a confirmed remote deletion.
        store.delete(EntityKind::Exception, &rec.id, false).unwrap();
    }

    #[test]
    fn list_pending_includes_tombstones_and_pending_statuses() {
        let store = test_store();
        let synced = make_record(EntityKind::Session, "2024-05-01", "act-1", SyncStatus::Synced);
        let created = make_record(EntityKind::Session, "2024-05-02", "act-1", SyncStatus::PendingCreate);
        let updated = make_record(EntityKind::Session, "2024-05-03", "act-1", SyncStatus::PendingUpdate);
        let tombstone = make_record(EntityKind::Session, "2024-05-04", "act-1", SyncStatus::Synced);
        for rec in [&synced, &created, &updated, &tombstone] {
            store.create(rec).unwrap();
        }
        store.delete(EntityKind::Session, &tombstone.id, true).unwrap();

        let pending = store.list_pending(EntityKind::Session).unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|r| r.id).collect();
        assert_eq!(pending.len(), 3);
        assert!(!ids.contains(&synced.id));
        assert!(ids.contains(&tombstone.id));
    }

    #[test]
    fn mark_synced_and_mark_deleted_close_out_records() {
        let store = test_store();
        let created = make_record(EntityKind::Attendance, "2024-05-02", "ses-1", SyncStatus::PendingCreate);
        let tombstone = make_record(EntityKind::Attendance, "2024-05-03", "ses-1", SyncStatus::Synced);
        store.create(&created).unwrap();
        store.create(&tombstone).unwrap();
        store.delete(EntityKind::Attendance, &tombstone.id, true).unwrap();

        store.mark_synced(EntityKind::Attendance, &created.id).unwrap();
        store.mark_deleted(EntityKind::Attendance, &tombstone.id).unwrap();

        assert!(store.list_pending(EntityKind::Attendance).unwrap().is_empty());
        assert!(store.get_by_id(EntityKind::Attendance, &tombstone.id).unwrap().is_none());
        assert!(matches!(
            store.mark_synced(EntityKind::Attendance, &tombstone.id),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn pending_counts_per_kind() {
        let store = test_store();
        store
            .create(&make_record(EntityKind::Session, "2024-05-01", "a", SyncStatus::PendingCreate))
            .unwrap();
        store
            .create(&make_record(EntityKind::Session, "2024-05-02", "a", SyncStatus::Synced))
            .unwrap();
        store
            .create(&make_record(EntityKind::Exception, "2024-05-02", "a", SyncStatus::PendingUpdate))
            .unwrap();

        let counts = store.pending_counts().unwrap();
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.exceptions, 1);
        assert_eq!(counts.activities, 0);
        assert_eq!(counts.total(), 2);
    }
}
