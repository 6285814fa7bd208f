pub mod app;
pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod sync;

use tracing_subscriber::EnvFilter;

/// Start the engine: install logging, load configuration, open the replica
/// and replay whatever was left pending by earlier sessions.
pub async fn run() -> Result<sync::ReconcileReport, app::AppError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::SyncConfig::from_env()?;
    let ctx = app::AppContext::open(config)?;

    let pending = ctx.pending_counts()?;
    tracing::info!(pending = pending.total(), "replica opened");

    let report = ctx.reconcile().await?;
    Ok(report)
}
