//! Startup reconciliation: replay every pending replica record against the
//! remote and close it out through the pending ledger.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::descriptor::{id_variables, write_variables, EntityDescriptor};
use super::SyncError;
use crate::db::PendingLedger;
use crate::models::*;
use crate::remote::{ConnectivityProbe, GatewayError, RemoteGateway};

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records the remote accepted and that are now synced or removed.
    pub replayed: usize,
    /// Tombstones of records the remote never saw, dropped locally.
    pub finalized_locally: usize,
    /// Records the remote declined; still pending.
    pub rejected: usize,
    /// Records left for a later run after the remote became unreachable.
    pub deferred: usize,
    /// The probe said offline, so nothing was attempted.
    pub offline: bool,
}

enum Replay {
    Done,
    Declined(String),
    Unreachable(GatewayError),
}

pub struct Reconciler<P, G, L> {
    probe: P,
    gateway: Arc<G>,
    ledger: Arc<L>,
}

impl<P, G, L> Reconciler<P, G, L>
where
    P: ConnectivityProbe,
    G: RemoteGateway,
    L: PendingLedger,
{
    pub fn new(probe: P, gateway: Arc<G>, ledger: Arc<L>) -> Self {
        Self {
            probe,
            gateway,
            ledger,
        }
    }

    /// Replay every pending record, kind by kind. A record the remote answers
    /// with an error counts as rejected and the run moves on; only an
    /// unreachable remote stops it, leaving the rest deferred.
    pub async fn run(&self) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();

        if !self.probe.probe().await.is_online() {
            for desc in EntityDescriptor::all() {
                report.deferred += self.ledger.list_pending(desc.kind)?.len();
            }
            report.offline = true;
            tracing::info!(deferred = report.deferred, "reconcile: offline, nothing replayed");
            return Ok(report);
        }

        let mut halted = false;
        for desc in EntityDescriptor::all() {
            let pending = self.ledger.list_pending(desc.kind)?;
            if halted {
                report.deferred += pending.len();
                continue;
            }

            for (index, record) in pending.iter().enumerate() {
                if record.is_tombstone() && record.sync_status == SyncStatus::PendingCreate {
                    self.ledger.mark_deleted(desc.kind, &record.id)?;
                    report.finalized_locally += 1;
                    continue;
                }

                match self.replay(desc, record).await {
                    Replay::Done => {
                        if record.is_tombstone() {
                            self.ledger.mark_deleted(desc.kind, &record.id)?;
                        } else {
                            self.ledger.mark_synced(desc.kind, &record.id)?;
                        }
                        report.replayed += 1;
                    }
                    Replay::Declined(mensaje) => {
                        tracing::warn!(kind = %desc.kind, id = %record.id, %mensaje, "reconcile: remote declined");
                        report.rejected += 1;
                    }
                    Replay::Unreachable(e) => {
                        tracing::warn!(kind = %desc.kind, id = %record.id, error = %e, "reconcile: remote unreachable, stopping");
                        report.deferred += pending.len() - index;
                        halted = true;
                        break;
                    }
                }
            }
        }

        tracing::info!(
            replayed = report.replayed,
            finalized_locally = report.finalized_locally,
            rejected = report.rejected,
            deferred = report.deferred,
            "reconcile: run finished"
        );
        Ok(report)
    }

    async fn replay(&self, desc: &EntityDescriptor, record: &EntityRecord) -> Replay {
        let (operation, variables): (&str, Value) = if record.is_tombstone() {
            (desc.delete_op, id_variables(&record.id))
        } else if record.sync_status == SyncStatus::PendingCreate {
            (desc.create_op, write_variables(&record.id, &record.payload))
        } else {
            (desc.update_op, write_variables(&record.id, &record.payload))
        };

        match self.gateway.mutate(operation, variables).await {
            Ok(reply) if reply.envelope.is_success() => Replay::Done,
            Ok(reply) => Replay::Declined(reply.envelope.mensaje),
            Err(e) if e.is_unreachable() => Replay::Unreachable(e),
            Err(e) => Replay::Declined(e.to_string()),
        }
    }
}
