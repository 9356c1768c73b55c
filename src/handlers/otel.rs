use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    handlers::{lenient_json, AppState},
};

/// Handle POST /v1/logs (OTLP/HTTP JSON logs export)
///
/// Records that are not `api_request` events, or carry no tokens, are
/// skipped silently. Malformed payloads add nothing.
pub async fn ingest_logs(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = lenient_json(&body);
    let added = state.ledger.ingest_otel(&payload).await?;

    Ok(Json(json!({ "ok": true, "sessions_added": added.len() })))
}
