use axum::{extract::State, Json};

use crate::{error::AppError, handlers::AppState, scan};

/// Handle GET /api/scan-logs
///
/// A missing log directory is reported in the body, not as an HTTP error.
pub async fn scan_logs(State(state): State<AppState>) -> Result<Json<scan::ScanReport>, AppError> {
    let dir = state.log_scan.resolved_dir();
    let limits = state.log_scan.limits();

    let report = tokio::task::spawn_blocking(move || scan::scan_logs(&dir, limits)).await?;

    Ok(Json(report))
}
