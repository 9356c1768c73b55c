use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coerce::{coerce_int, coerce_text, lenient_int, lenient_text, null_as_default};

pub const DEFAULT_MONTHLY_LIMIT: i64 = 45_000_000;
pub const DEFAULT_WEEKLY_LIMIT: i64 = 11_000_000;
/// 5-hour rolling window
pub const DEFAULT_SESSION_LIMIT: i64 = 1_500_000;
pub const DEFAULT_RESET_DAY: i64 = 1;

/// Root object of the persisted usage file.
///
/// Limits are display-only ceilings for the dashboard and are never enforced
/// here. `sessions` is kept in insertion order, which is also the order used
/// for positional deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDocument {
    #[serde(default = "default_monthly_limit", deserialize_with = "lenient_int")]
    pub monthly_limit: i64,
    #[serde(default = "default_weekly_limit", deserialize_with = "lenient_int")]
    pub weekly_limit: i64,
    #[serde(default = "default_session_limit", deserialize_with = "lenient_int")]
    pub session_limit: i64,
    /// Day of month anchoring the monthly window
    #[serde(default = "default_reset_day", deserialize_with = "lenient_int")]
    pub reset_day: i64,
    /// A `null` list in the file reads as empty
    #[serde(default, deserialize_with = "null_as_default")]
    pub sessions: Vec<SessionRecord>,
    /// Opaque client calibration payloads, append-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrations: Option<Vec<Value>>,
    /// Untyped `limit` written by the settings endpoint. Not reconciled with
    /// the three typed limits above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Any other top-level keys found in the file, preserved on save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_monthly_limit() -> i64 {
    DEFAULT_MONTHLY_LIMIT
}

fn default_weekly_limit() -> i64 {
    DEFAULT_WEEKLY_LIMIT
}

fn default_session_limit() -> i64 {
    DEFAULT_SESSION_LIMIT
}

fn default_reset_day() -> i64 {
    DEFAULT_RESET_DAY
}

impl Default for UsageDocument {
    fn default() -> Self {
        Self::with_limits(
            DEFAULT_MONTHLY_LIMIT,
            DEFAULT_WEEKLY_LIMIT,
            DEFAULT_SESSION_LIMIT,
            DEFAULT_RESET_DAY,
        )
    }
}

impl UsageDocument {
    /// Fresh document with the given limits and no sessions
    pub fn with_limits(monthly: i64, weekly: i64, session: i64, reset_day: i64) -> Self {
        Self {
            monthly_limit: monthly,
            weekly_limit: weekly,
            session_limit: session,
            reset_day,
            sessions: Vec::new(),
            calibrations: None,
            limit: None,
            extra: Map::new(),
        }
    }

    /// Sum of input and output tokens across all sessions
    pub fn total_tokens(&self) -> i64 {
        self.sessions
            .iter()
            .map(|s| s.input.saturating_add(s.output))
            .fold(0i64, |acc, t| acc.saturating_add(t))
    }
}

/// One usage entry, immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Server-assigned local ISO-8601 timestamp
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: String,
    /// Quota-relevant input tokens (includes cache creation, excludes cache reads)
    #[serde(default, deserialize_with = "lenient_int")]
    pub input: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub output: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub note: String,
    /// Fields written by other clients, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    /// Create a record stamped with the current wall-clock time
    pub fn new(input: i64, output: i64, note: impl Into<String>) -> Self {
        Self {
            timestamp: now_timestamp(),
            input,
            output,
            note: note.into(),
            extra: Map::new(),
        }
    }

    /// Build a manual entry from a client body `{input, output, note}`.
    ///
    /// Missing or non-numeric counts become 0; the timestamp is never taken
    /// from the client.
    pub fn from_manual_entry(body: &Value) -> Self {
        let int_field = |key: &str| body.get(key).and_then(coerce_int).unwrap_or(0);
        let note = body.get("note").map(coerce_text).unwrap_or_default();

        Self::new(int_field("input"), int_field("output"), note)
    }
}

/// Local wall-clock time as ISO-8601 without offset, microsecond precision
pub fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
