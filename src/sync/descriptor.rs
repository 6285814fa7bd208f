//! Per-kind descriptors: remote operation names, the payload fields that feed
//! the replica indexes, and the counter that protects a row from deletion.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub create_op: &'static str,
    pub update_op: &'static str,
    pub delete_op: &'static str,
    pub detail_op: &'static str,
    pub range_op: &'static str,
    /// Batch mutation taking a whole change set; `None` for kinds that are
    /// never edited as a grid.
    pub batch_op: Option<&'static str>,
    /// Payload field copied into `range_key`.
    pub range_field: Option<&'static str>,
    /// Payload field copied into `scope_id`.
    pub scope_field: Option<&'static str>,
    /// Payload counter that, when above zero, blocks edits and deletion.
    pub protected_counter: Option<&'static str>,
}

pub const ACTIVITY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Activity,
    create_op: "crearActividad",
    update_op: "actualizarActividad",
    delete_op: "eliminarActividad",
    detail_op: "actividad",
    range_op: "actividadesPorRango",
    batch_op: None,
    range_field: Some("fechaInicio"),
    scope_field: Some("sedeId"),
    protected_counter: None,
};

pub const SESSION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Session,
    create_op: "crearSesion",
    update_op: "actualizarSesion",
    delete_op: "eliminarSesion",
    detail_op: "sesion",
    range_op: "sesionesPorRango",
    batch_op: Some("guardarSesiones"),
    range_field: Some("fecha"),
    scope_field: Some("actividadId"),
    protected_counter: Some("asistentes"),
};

pub const ATTENDANCE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Attendance,
    create_op: "registrarAsistencia",
    update_op: "actualizarAsistencia",
    delete_op: "eliminarAsistencia",
    detail_op: "asistencia",
    range_op: "asistenciasPorRango",
    batch_op: Some("guardarAsistencias"),
    range_field: Some("fecha"),
    scope_field: Some("sesionId"),
    protected_counter: None,
};

pub const BENEFICIARY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Beneficiary,
    create_op: "crearBeneficiario",
    update_op: "actualizarBeneficiario",
    delete_op: "eliminarBeneficiario",
    detail_op: "beneficiario",
    range_op: "beneficiariosPorRango",
    batch_op: Some("guardarBeneficiarios"),
    range_field: Some("fechaRegistro"),
    scope_field: Some("sedeId"),
    protected_counter: None,
};

pub const EXCEPTION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Exception,
    create_op: "crearExcepcion",
    update_op: "actualizarExcepcion",
    delete_op: "eliminarExcepcion",
    detail_op: "excepcion",
    range_op: "excepcionesPorRango",
    batch_op: Some("guardarExcepciones"),
    range_field: Some("fecha"),
    scope_field: Some("actividadId"),
    protected_counter: None,
};

const ALL_DESCRIPTORS: [&EntityDescriptor; 5] = [&ACTIVITY, &SESSION, &ATTENDANCE, &BENEFICIARY, &EXCEPTION];

impl EntityDescriptor {
    pub fn for_kind(kind: EntityKind) -> &'static EntityDescriptor {
        match kind {
            EntityKind::Activity => &ACTIVITY,
            EntityKind::Session => &SESSION,
            EntityKind::Attendance => &ATTENDANCE,
            EntityKind::Beneficiary => &BENEFICIARY,
            EntityKind::Exception => &EXCEPTION,
        }
    }

    pub fn all() -> [&'static EntityDescriptor; 5] {
        ALL_DESCRIPTORS
    }

    /// `(range_key, scope_id)` extracted from a payload.
    pub fn index_keys(&self, payload: &Value) -> (Option<String>, Option<String>) {
        let read = |field: Option<&str>| field.and_then(|f| payload.get(f)).and_then(key_text);
        (read(self.range_field), read(self.scope_field))
    }

    /// Current value of the protected counter; 0 when the kind has none or
    /// the payload does not carry it.
    pub fn protected_count(&self, payload: &Value) -> u32 {
        self.protected_counter
            .and_then(|field| payload.get(field))
            .and_then(Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    /// Build a record of this kind with audit fields stamped for `actor`.
    pub fn new_record(
        &self,
        id: Uuid,
        payload: Value,
        sync_status: SyncStatus,
        actor: &str,
        at: DateTime<Utc>,
    ) -> EntityRecord {
        let (range_key, scope_id) = self.index_keys(&payload);
        EntityRecord {
            id,
            kind: self.kind,
            payload,
            range_key,
            scope_id,
            sync_status,
            deleted: None,
            audit: Audit::created(actor, at),
        }
    }

    /// Placeholder kept for a deletion made offline against a record the
    /// replica never mirrored. It was known to the remote, hence `synced`.
    pub fn tombstone(&self, id: Uuid) -> EntityRecord {
        EntityRecord {
            id,
            kind: self.kind,
            payload: json!({}),
            range_key: None,
            scope_id: None,
            sync_status: SyncStatus::Synced,
            deleted: Some(true),
            audit: Audit::default(),
        }
    }

    /// Record as returned by a remote detail or range query.
    pub fn from_remote(&self, id: Uuid, payload: Value) -> EntityRecord {
        let (range_key, scope_id) = self.index_keys(&payload);
        EntityRecord {
            id,
            kind: self.kind,
            payload,
            range_key,
            scope_id,
            sync_status: SyncStatus::Synced,
            deleted: None,
            audit: Audit::default(),
        }
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Variables for create and update mutations.
pub fn write_variables(id: &Uuid, payload: &Value) -> Value {
    json!({ "id": id.to_string(), "datos": payload })
}

/// Variables for delete mutations and detail queries.
pub fn id_variables(id: &Uuid) -> Value {
    json!({ "id": id.to_string() })
}

/// Variables for range queries.
pub fn range_variables(from: &str, to: &str, scope_id: Option<&str>) -> Value {
    json!({ "desde": from, "hasta": to, "ambito": scope_id })
}
