//! Application context: one replica, one gateway, and the orchestrator and
//! reconciler built on them.
//!
//! Created once at startup and shared behind an `Arc` by whatever front end
//! drives the engine.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::{self, ConfigError, SyncConfig};
use crate::db::{self, DatabaseError, PendingCounts, ReplicaStore};
use crate::models::{AttendancePhoto, PhotoError};
use crate::remote::{EnvCredential, GatewayError, HttpGateway, RemoteProbe};
use crate::sync::descriptor::ATTENDANCE;
use crate::sync::{ReconcileReport, Reconciler, SyncError, SyncOrchestrator, WriteOutcome};

pub type Gateway = HttpGateway<EnvCredential>;
pub type Probe = RemoteProbe<Gateway>;
pub type Orchestrator = SyncOrchestrator<Probe, Gateway, ReplicaStore>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Remote client error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Photo error: {0}")]
    Photo(#[from] PhotoError),
}

pub struct AppContext {
    pub config: SyncConfig,
    store: Arc<ReplicaStore>,
    orchestrator: Orchestrator,
    reconciler: Reconciler<Probe, Gateway, ReplicaStore>,
}

impl AppContext {
    /// Open the replica at `config.db_path` (running migrations) and wire
    /// the HTTP gateway, the probe and the sync services around it.
    pub fn open(config: SyncConfig) -> Result<Self, AppError> {
        let conn = db::open_database(&config.db_path)?;
        Self::with_store(config, ReplicaStore::new(conn))
    }

    pub fn with_store(config: SyncConfig, store: ReplicaStore) -> Result<Self, AppError> {
        let store = Arc::new(store);
        let gateway = Arc::new(HttpGateway::new(
            &config.endpoint,
            config.timeout_secs,
            EnvCredential::new(config::TOKEN_ENV_VAR),
        )?);
        let probe = RemoteProbe::new(Arc::clone(&gateway), &config.probe_operation, &config.online_token);

        let orchestrator = SyncOrchestrator::new(probe.clone(), Arc::clone(&gateway), Arc::clone(&store));
        let reconciler = Reconciler::new(probe, gateway, Arc::clone(&store));

        tracing::info!(
            endpoint = %config.endpoint,
            db = %config.db_path.display(),
            "sync engine ready"
        );

        Ok(Self {
            config,
            store,
            orchestrator,
            reconciler,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Replay everything pending against the remote.
    pub async fn reconcile(&self) -> Result<ReconcileReport, SyncError> {
        self.reconciler.run().await
    }

    /// Pending records per kind, for a status display.
    pub fn pending_counts(&self) -> Result<PendingCounts, DatabaseError> {
        self.store.pending_counts()
    }

    /// Record attendance, embedding `photo` in the payload when given.
    pub async fn record_attendance(
        &self,
        mut payload: Value,
        photo: Option<&AttendancePhoto>,
        actor: &str,
    ) -> Result<WriteOutcome, AppError> {
        if let Some(photo) = photo {
            photo.attach(&mut payload)?;
        }
        Ok(self.orchestrator.create(&ATTENDANCE, payload, actor).await?)
    }
}
