use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Application error types
///
/// Only failures that abort a request live here. An out-of-range delete
/// index is answered in-band with `{ok: false}` and never becomes an
/// `AppError`.
#[derive(Debug)]
pub enum AppError {
    /// Usage file exists but cannot be parsed
    CorruptStore(String),
    /// Usage file could not be read or written
    Storage(String),
    /// Blocking task failed to complete
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CorruptStore(msg) => write!(f, "Corrupt usage store: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::CorruptStore(_) => "corrupt_store",
        AppError::Storage(_) => "storage_error",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { .. } => Self::CorruptStore(err.to_string()),
            StoreError::Io { .. } | StoreError::Serialize(_) => Self::Storage(err.to_string()),
            StoreError::Task(_) => Self::InternalError(err.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Store(e) => e.into(),
            LedgerError::InvalidIndex => Self::InternalError(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError(err.to_string())
    }
}
