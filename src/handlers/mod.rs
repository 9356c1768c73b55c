//! HTTP handlers
//!
//! - `usage`: usage document reads and manual mutations
//! - `otel`: OpenTelemetry logs ingestion
//! - `scan`: diagnostic log scan
//! - `metrics_handler`: Prometheus exposition

pub mod metrics_handler;
pub mod otel;
pub mod scan;
pub mod usage;

use axum::body::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::LogScanConfig;
use crate::ledger::UsageLedger;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<UsageLedger>,
    pub log_scan: Arc<LogScanConfig>,
}

/// Parse a request body as JSON. Empty or malformed bodies become `{}`.
pub fn lenient_json(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Treating malformed request body as empty object");
        Value::Object(Map::new())
    })
}
