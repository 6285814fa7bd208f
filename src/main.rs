#[tokio::main]
async fn main() {
    match agenda_lib::run().await {
        Ok(report) => tracing::info!(
            replayed = report.replayed,
            deferred = report.deferred,
            offline = report.offline,
            "startup reconciliation finished"
        ),
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
