//! Drowsiness Monitor - Main Entry Point

use monitor::{init_logging, run, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.log)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Starting driver monitoring...");

    let summary = run(config).await?;
    info!(
        "Processed {} frames, dropped {}, skipped {}, dispatched {} alerts",
        summary.frames_processed,
        summary.frames_dropped,
        summary.frames_skipped,
        summary.alerts_dispatched
    );

    Ok(())
}
