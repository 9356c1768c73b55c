use anyhow::Result;
use tracing::info;
use usage_tracker::{config::Config, scan};

/// Execute the scan command
///
/// Prints the same report served by GET /api/scan-logs
pub async fn execute(cfg: &Config) -> Result<()> {
    let dir = cfg.log_scan.resolved_dir();
    let limits = cfg.log_scan.limits();
    info!("Scanning {} for token usage entries", dir.display());

    let report = tokio::task::spawn_blocking(move || scan::scan_logs(&dir, limits)).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
