//! Probe-first write and read paths shared by every entity kind.
//!
//! Each operation probes connectivity, then either goes through the remote
//! gateway and mirrors the accepted result as `synced`, or writes the local
//! replica tagged pending. A transport failure after an online probe takes
//! the local path too, with a technical-error envelope.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::changeset::{ChangeSet, GuardedAction, RowRejection};
use super::descriptor::{id_variables, range_variables, write_variables, EntityDescriptor};
use super::SyncError;
use crate::db::{DatabaseError, LocalStore, PayloadPatch, RecordPatch};
use crate::models::*;
use crate::remote::{ConnectivityProbe, MutationReply, RemoteGateway};

/// Which path a write took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePath {
    /// Remote accepted; replica mirrors it as `synced`.
    Remote,
    /// Probe said offline; replica holds the write as pending.
    Local,
    /// Probe said online but the call failed in transit; written as pending.
    LocalFallback,
    /// Remote declined; replica untouched.
    Rejected,
    /// Refused before any store or network call.
    Blocked,
    /// Nothing to submit.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub envelope: Envelope,
    pub path: WritePath,
    /// Replica state after the write, when the write left one.
    pub record: Option<EntityRecord>,
}

impl WriteOutcome {
    fn new(envelope: Envelope, path: WritePath, record: Option<EntityRecord>) -> Self {
        Self {
            envelope,
            path,
            record,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub source: ReadSource,
    pub record: Option<EntityRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeListing {
    pub source: ReadSource,
    pub records: Vec<EntityRecord>,
}

/// Result of a remote call, already split into the three cases the write
/// paths care about.
enum RemoteVerdict {
    Accepted(Option<Value>, Envelope),
    Declined(Envelope),
    Unreachable,
}

/// One orchestrator serves every entity kind; the descriptor passed to each
/// call picks the remote operations and the replica table.
pub struct SyncOrchestrator<P, G, S> {
    probe: P,
    gateway: Arc<G>,
    store: Arc<S>,
}

impl<P, G, S> SyncOrchestrator<P, G, S>
where
    P: ConnectivityProbe,
    G: RemoteGateway,
    S: LocalStore,
{
    pub fn new(probe: P, gateway: Arc<G>, store: Arc<S>) -> Self {
        Self {
            probe,
            gateway,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ═══════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════

    /// Create a record from `payload` with a fresh client-side id.
    pub async fn create(
        &self,
        desc: &EntityDescriptor,
        payload: Value,
        actor: &str,
    ) -> Result<WriteOutcome, SyncError> {
        let record = desc.new_record(Uuid::new_v4(), payload, SyncStatus::PendingCreate, actor, Utc::now());
        self.create_record(desc, record).await
    }

    /// Create a record whose id and audit fields the caller already set.
    pub async fn create_record(
        &self,
        desc: &EntityDescriptor,
        record: EntityRecord,
    ) -> Result<WriteOutcome, SyncError> {
        let online = self.probe.probe().await.is_online();
        tracing::debug!(kind = %desc.kind, id = %record.id, online, "create");

        let fallback = if online {
            let verdict = self
                .dispatch(desc.create_op, write_variables(&record.id, &record.payload))
                .await;
            match verdict {
                RemoteVerdict::Accepted(accepted, envelope) => {
                    let stored = self.mirror_synced(desc, record, accepted.as_ref())?;
                    return Ok(WriteOutcome::new(envelope, WritePath::Remote, Some(stored)));
                }
                RemoteVerdict::Declined(envelope) => {
                    return Ok(WriteOutcome::new(envelope, WritePath::Rejected, None));
                }
                RemoteVerdict::Unreachable => true,
            }
        } else {
            false
        };

        let mut pending = record;
        pending.sync_status = SyncStatus::PendingCreate;
        let stored = self.upsert(&pending)?;
        Ok(local_outcome(fallback, stored))
    }

    /// Apply a partial update. Only the fields present in `patch` change.
    pub async fn update(
        &self,
        desc: &EntityDescriptor,
        id: &Uuid,
        patch: Value,
        actor: &str,
    ) -> Result<WriteOutcome, SyncError> {
        let now = Utc::now();
        let existing = self.store.get_by_id(desc.kind, id)?;
        let pending_status = pending_update_status(existing.as_ref());
        let candidate = match existing {
            Some(mut record) => {
                merge_payload(&mut record.payload, &patch);
                refresh_keys(desc, &mut record);
                record.audit.touch(actor, now);
                record
            }
            None => desc.new_record(*id, patch.clone(), pending_status, actor, now),
        };

        let online = self.probe.probe().await.is_online();
        tracing::debug!(kind = %desc.kind, %id, online, "update");

        let fallback = if online {
            match self.dispatch(desc.update_op, write_variables(id, &patch)).await {
                RemoteVerdict::Accepted(accepted, envelope) => {
                    let stored = self.mirror_synced(desc, candidate, accepted.as_ref())?;
                    return Ok(WriteOutcome::new(envelope, WritePath::Remote, Some(stored)));
                }
                RemoteVerdict::Declined(envelope) => {
                    return Ok(WriteOutcome::new(envelope, WritePath::Rejected, None));
                }
                RemoteVerdict::Unreachable => true,
            }
        } else {
            false
        };

        let mut pending = candidate;
        pending.sync_status = pending_status;
        let stored = self.upsert(&pending)?;
        Ok(local_outcome(fallback, stored))
    }

    /// Delete a record. `protected_count` is the row's guard counter as the
    /// caller sees it; above zero the deletion is refused outright.
    pub async fn delete(
        &self,
        desc: &EntityDescriptor,
        id: &Uuid,
        protected_count: u32,
    ) -> Result<WriteOutcome, SyncError> {
        if protected_count > 0 {
            let rejection = RowRejection::Protected {
                kind: desc.kind,
                count: protected_count,
                action: GuardedAction::Delete,
            };
            tracing::info!(kind = %desc.kind, %id, protected_count, "delete blocked");
            return Ok(WriteOutcome::new(rejection.into(), WritePath::Blocked, None));
        }

        let online = self.probe.probe().await.is_online();
        tracing::debug!(kind = %desc.kind, %id, online, "delete");

        let fallback = if online {
            match self.dispatch(desc.delete_op, id_variables(id)).await {
                RemoteVerdict::Accepted(_, envelope) => {
                    self.store.delete(desc.kind, id, false)?;
                    return Ok(WriteOutcome::new(envelope, WritePath::Remote, None));
                }
                RemoteVerdict::Declined(envelope) => {
                    return Ok(WriteOutcome::new(envelope, WritePath::Rejected, None));
                }
                RemoteVerdict::Unreachable => true,
            }
        } else {
            false
        };

        let stored = self.soft_delete(desc, id)?;
        Ok(local_outcome(fallback, stored))
    }

    /// Submit a tracked change set as one batch mutation.
    pub async fn submit_changes(
        &self,
        desc: &EntityDescriptor,
        changes: &ChangeSet,
        actor: &str,
    ) -> Result<WriteOutcome, SyncError> {
        let batch_op = desc
            .batch_op
            .ok_or(SyncError::BatchUnsupported { kind: desc.kind })?;

        if changes.is_empty() {
            return Ok(WriteOutcome::new(
                Envelope::success("no changes to save"),
                WritePath::Unchanged,
                None,
            ));
        }

        let online = self.probe.probe().await.is_online();
        tracing::debug!(
            kind = %desc.kind,
            created = changes.created.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted_ids.len(),
            online,
            "submit change set"
        );

        let fallback = if online {
            let variables = json!({ "cambios": changes.to_wire() });
            match self.dispatch(batch_op, variables).await {
                RemoteVerdict::Accepted(_, envelope) => {
                    for record in changes.created.iter().chain(&changes.updated) {
                        self.mirror_synced(desc, record.clone(), None)?;
                    }
                    for id in &changes.deleted_ids {
                        self.store.delete(desc.kind, id, false)?;
                    }
                    return Ok(WriteOutcome::new(envelope, WritePath::Remote, None));
                }
                RemoteVerdict::Declined(envelope) => {
                    return Ok(WriteOutcome::new(envelope, WritePath::Rejected, None));
                }
                RemoteVerdict::Unreachable => true,
            }
        } else {
            false
        };

        for record in &changes.created {
            let mut pending = record.clone();
            pending.sync_status = SyncStatus::PendingCreate;
            self.upsert(&pending)?;
        }
        for record in &changes.updated {
            let existing = self.store.get_by_id(desc.kind, &record.id)?;
            let mut pending = record.clone();
            pending.audit.touch(actor, Utc::now());
            pending.sync_status = pending_update_status(existing.as_ref());
            self.upsert(&pending)?;
        }
        for id in &changes.deleted_ids {
            self.soft_delete(desc, id)?;
        }

        let envelope = if fallback {
            Envelope::technical_fallback()
        } else {
            Envelope::saved_locally()
        };
        let path = if fallback {
            WritePath::LocalFallback
        } else {
            WritePath::Local
        };
        Ok(WriteOutcome::new(envelope, path, None))
    }

    // ═══════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════

    /// Detail lookup: remote when reachable, replica otherwise. Never
    /// changes any sync status.
    pub async fn fetch_detail(&self, desc: &EntityDescriptor, id: &Uuid) -> Result<Detail, SyncError> {
        if self.probe.probe().await.is_online() {
            match self.gateway.query(desc.detail_op, id_variables(id)).await {
                Ok(Value::Null) => {
                    return Ok(Detail {
                        source: ReadSource::Remote,
                        record: None,
                    })
                }
                Ok(value @ Value::Object(_)) => {
                    return Ok(Detail {
                        source: ReadSource::Remote,
                        record: Some(desc.from_remote(*id, without_id(value))),
                    })
                }
                Ok(other) => {
                    tracing::warn!(kind = %desc.kind, %id, value = %other, "detail: unexpected shape, reading replica")
                }
                Err(e) => tracing::warn!(kind = %desc.kind, %id, error = %e, "detail: remote failed, reading replica"),
            }
        }

        Ok(Detail {
            source: ReadSource::Local,
            record: self.store.get_by_id(desc.kind, id)?,
        })
    }

    /// Range listing for calendar and grid loads. The local fallback
    /// excludes tombstones.
    pub async fn list_range(
        &self,
        desc: &EntityDescriptor,
        from: &str,
        to: &str,
        scope_id: Option<&str>,
    ) -> Result<RangeListing, SyncError> {
        if self.probe.probe().await.is_online() {
            match self
                .gateway
                .query(desc.range_op, range_variables(from, to, scope_id))
                .await
            {
                Ok(Value::Array(items)) => {
                    return Ok(RangeListing {
                        source: ReadSource::Remote,
                        records: records_from_remote(desc, items),
                    })
                }
                Ok(other) => {
                    tracing::warn!(kind = %desc.kind, value = %other, "range: unexpected shape, reading replica")
                }
                Err(e) => tracing::warn!(kind = %desc.kind, error = %e, "range: remote failed, reading replica"),
            }
        }

        Ok(RangeListing {
            source: ReadSource::Local,
            records: self.store.get_by_range(desc.kind, from, to, scope_id)?,
        })
    }

    // ═══════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════

    async fn dispatch(&self, operation: &str, variables: Value) -> RemoteVerdict {
        match self.gateway.mutate(operation, variables).await {
            Ok(MutationReply { envelope, record }) if envelope.is_success() => {
                RemoteVerdict::Accepted(record, envelope)
            }
            Ok(MutationReply { envelope, .. }) => {
                tracing::info!(operation, mensaje = %envelope.mensaje, "remote declined");
                RemoteVerdict::Declined(envelope)
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, "remote call failed after online probe, saving locally");
                RemoteVerdict::Unreachable
            }
        }
    }

    /// Store `record` as `synced`, folding in whatever the remote echoed.
    /// Remote fields win over local ones.
    fn mirror_synced(
        &self,
        desc: &EntityDescriptor,
        mut record: EntityRecord,
        accepted: Option<&Value>,
    ) -> Result<EntityRecord, SyncError> {
        if let Some(accepted) = accepted.filter(|v| v.is_object()) {
            merge_payload(&mut record.payload, &without_id(accepted.clone()));
            refresh_keys(desc, &mut record);
        }
        record.sync_status = SyncStatus::Synced;
        self.upsert(&record)
    }

    /// Insert `record`, or overwrite the stored one with the same id.
    fn upsert(&self, record: &EntityRecord) -> Result<EntityRecord, SyncError> {
        if self.store.get_by_id(record.kind, &record.id)?.is_none() {
            self.store.create(record)?;
            return Ok(record.clone());
        }
        let patch = RecordPatch {
            payload: Some(PayloadPatch::Replace(record.payload.clone())),
            range_key: Some(record.range_key.clone()),
            scope_id: Some(record.scope_id.clone()),
            sync_status: Some(record.sync_status),
            modified_by: record.audit.modified_by.clone(),
            modified_at: record.audit.modified_at,
        };
        Ok(self.store.update(record.kind, &record.id, &patch)?)
    }

    /// Tombstone a record, leaving a bare tombstone when the replica never
    /// mirrored it. Its sync status is kept.
    fn soft_delete(&self, desc: &EntityDescriptor, id: &Uuid) -> Result<EntityRecord, SyncError> {
        if self.store.get_by_id(desc.kind, id)?.is_none() {
            let tombstone = desc.tombstone(*id);
            self.store.create(&tombstone)?;
            return Ok(tombstone);
        }
        self.store.delete(desc.kind, id, true)?;
        self.store
            .get_by_id(desc.kind, id)?
            .ok_or_else(|| {
                SyncError::Database(DatabaseError::NotFound {
                    entity_type: desc.kind.as_str().to_string(),
                    id: id.to_string(),
                })
            })
    }
}

fn local_outcome(fallback: bool, stored: EntityRecord) -> WriteOutcome {
    if fallback {
        WriteOutcome::new(Envelope::technical_fallback(), WritePath::LocalFallback, Some(stored))
    } else {
        WriteOutcome::new(Envelope::saved_locally(), WritePath::Local, Some(stored))
    }
}

/// A record that never reached the remote stays `pending-create`; anything
/// else becomes `pending-update`.
fn pending_update_status(existing: Option<&EntityRecord>) -> SyncStatus {
    match existing.map(|r| r.sync_status) {
        Some(SyncStatus::PendingCreate) => SyncStatus::PendingCreate,
        _ => SyncStatus::PendingUpdate,
    }
}

fn refresh_keys(desc: &EntityDescriptor, record: &mut EntityRecord) {
    let (range_key, scope_id) = desc.index_keys(&record.payload);
    record.range_key = range_key;
    record.scope_id = scope_id;
}

fn without_id(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    value
}

fn records_from_remote(desc: &EntityDescriptor, items: Vec<Value>) -> Vec<EntityRecord> {
    items
        .into_iter()
        .filter_map(|item| {
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok());
            match id {
                Some(id) => Some(desc.from_remote(id, without_id(item))),
                None => {
                    tracing::warn!(kind = %desc.kind, "range: skipping remote row without a valid id");
                    None
                }
            }
        })
        .collect()
}
