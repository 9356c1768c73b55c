use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    handlers::{lenient_json, AppState},
    ledger::LedgerError,
    models::{SessionRecord, UsageDocument},
};

/// Handle GET /api/usage
pub async fn get_usage(State(state): State<AppState>) -> Result<Json<UsageDocument>, AppError> {
    let doc = state.ledger.snapshot().await?;
    Ok(Json(doc))
}

/// Handle POST /api/session
///
/// Body `{input, output, note}`; missing fields default to 0 / "".
pub async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = lenient_json(&body);
    let record = SessionRecord::from_manual_entry(&body);

    let session = state.ledger.record_session(record).await?;

    Ok(Json(json!({ "ok": true, "session": session })))
}

/// Handle POST /api/settings
///
/// Only `limit` and `resetDay` are read. `limit` is stored under its own key
/// and is not mapped onto the monthly/weekly/session limits.
pub async fn update_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let patch = lenient_json(&body);
    state.ledger.update_settings(&patch).await?;

    Ok(Json(json!({ "ok": true })))
}

/// Handle POST /api/delete-session
///
/// An invalid index is a soft failure: HTTP 200 with `ok: false`.
pub async fn delete_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = lenient_json(&body);

    match state.ledger.delete_session(body.get("index")).await {
        Ok(removed) => Ok(Json(json!({ "ok": true, "removed": removed }))),
        Err(err @ LedgerError::InvalidIndex) => {
            tracing::debug!(index = ?body.get("index"), "Rejected delete with invalid index");
            Ok(Json(json!({ "ok": false, "error": err.to_string() })))
        }
        Err(err) => Err(err.into()),
    }
}

/// Handle POST /api/calibration
pub async fn add_calibration(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = lenient_json(&body);
    let calibration = state.ledger.add_calibration(payload).await?;

    Ok(Json(json!({ "ok": true, "calibration": calibration })))
}
