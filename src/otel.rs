//! Usage extraction from OpenTelemetry JSON log exports.
//!
//! Payloads are walked as untyped JSON so that any missing or mistyped level
//! of `resourceLogs → scopeLogs → logRecords → attributes` simply yields
//! nothing instead of failing the whole batch.

use serde_json::Value;

use crate::models::coerce::{coerce_int, is_truthy};
use crate::models::SessionRecord;

/// `event.name` of the records that carry per-request token counts
pub const API_REQUEST_EVENT: &str = "api_request";

const EVENT_NAME_KEY: &str = "event.name";
const INPUT_TOKENS_KEY: &str = "input_tokens";
const OUTPUT_TOKENS_KEY: &str = "output_tokens";
const CACHE_READ_TOKENS_KEY: &str = "cache_read_tokens";
const CACHE_CREATION_TOKENS_KEY: &str = "cache_creation_tokens";
const MODEL_KEY: &str = "model";

/// Scalar carried by an attribute after resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Double(f64),
    Text(String),
    Bool(bool),
}

impl Scalar {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Double(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => Scalar::Text(s.clone()),
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Null => Scalar::Int(0),
            other => Scalar::Text(other.to_string()),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Scalar::Int(i) => *i != 0,
            Scalar::Double(f) => *f != 0.0,
            Scalar::Text(s) => !s.is_empty(),
            Scalar::Bool(b) => *b,
        }
    }

    /// Token-count view: falsy values and unparseable text count as 0
    pub fn as_count(&self) -> i64 {
        if !self.is_truthy() {
            return 0;
        }
        match self {
            Scalar::Int(i) => *i,
            Scalar::Double(f) => *f as i64,
            Scalar::Text(s) => coerce_int(&Value::String(s.clone())).unwrap_or(0),
            Scalar::Bool(b) => i64::from(*b),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Scalar::Int(i) => i.to_string(),
            Scalar::Double(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// OTLP `AnyValue` as exported in JSON: at most one of the typed slots is
/// expected to be populated, but nothing enforces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnyValue<'a> {
    pub int_value: Option<&'a Value>,
    pub string_value: Option<&'a Value>,
    pub double_value: Option<&'a Value>,
}

impl<'a> AnyValue<'a> {
    pub fn from_json(value: &'a Value) -> Self {
        Self {
            int_value: value.get("intValue"),
            string_value: value.get("stringValue"),
            double_value: value.get("doubleValue"),
        }
    }

    /// Pick the effective scalar: `intValue` if truthy, else `stringValue` if
    /// truthy, else `doubleValue` as-is, else integer zero.
    ///
    /// Known quirks: a genuine `intValue` of 0 is indistinguishable from an
    /// absent one and falls through to the next slot. An explicit
    /// `doubleValue: null` resolves to integer zero, so a `model` attribute
    /// shaped that way yields the note `"auto: 0"`.
    pub fn resolve(&self) -> Scalar {
        if let Some(v) = self.int_value.filter(|v| is_truthy(v)) {
            return Scalar::from_json(v);
        }
        if let Some(v) = self.string_value.filter(|v| is_truthy(v)) {
            return Scalar::from_json(v);
        }
        match self.double_value {
            Some(v) => Scalar::from_json(v),
            None => Scalar::Int(0),
        }
    }
}

/// Token counts of one `api_request` log record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRequestUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub model: String,
}

impl ApiRequestUsage {
    /// Input tokens that count toward quota. Cache reads are excluded.
    pub fn quota_input(&self) -> i64 {
        self.input_tokens.saturating_add(self.cache_creation_tokens)
    }

    pub fn note(&self) -> String {
        if self.model.is_empty() {
            "auto".to_string()
        } else {
            format!("auto: {}", self.model)
        }
    }

    /// Stamp with the current wall-clock time
    pub fn to_session(&self) -> SessionRecord {
        SessionRecord::new(self.quota_input(), self.output_tokens, self.note())
    }
}

/// Result of walking one payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Log records visited, qualifying or not
    pub records_seen: usize,
    pub usages: Vec<ApiRequestUsage>,
}

impl Extraction {
    pub fn skipped(&self) -> usize {
        self.records_seen - self.usages.len()
    }
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Flatten `resourceLogs → scopeLogs → logRecords` in document order
pub fn log_records(payload: &Value) -> impl Iterator<Item = &Value> {
    array_field(payload, "resourceLogs")
        .iter()
        .flat_map(|resource| array_field(resource, "scopeLogs"))
        .flat_map(|scope| array_field(scope, "logRecords"))
}

/// Read one log record. Returns `None` unless it is an `api_request` event
/// with at least one positive input or output count.
pub fn parse_record(record: &Value) -> Option<ApiRequestUsage> {
    let mut event_name = None;
    let mut usage = ApiRequestUsage::default();

    for attr in array_field(record, "attributes") {
        let Some(key) = attr.get("key").and_then(Value::as_str) else {
            continue;
        };
        let value = attr
            .get("value")
            .map(AnyValue::from_json)
            .unwrap_or_default()
            .resolve();

        match key {
            EVENT_NAME_KEY => event_name = Some(value),
            INPUT_TOKENS_KEY => usage.input_tokens = value.as_count(),
            OUTPUT_TOKENS_KEY => usage.output_tokens = value.as_count(),
            CACHE_READ_TOKENS_KEY => usage.cache_read_tokens = value.as_count(),
            CACHE_CREATION_TOKENS_KEY => usage.cache_creation_tokens = value.as_count(),
            MODEL_KEY => usage.model = value.as_text(),
            _ => {}
        }
    }

    let is_api_request = matches!(&event_name, Some(Scalar::Text(name)) if name == API_REQUEST_EVENT);
    if is_api_request && (usage.input_tokens > 0 || usage.output_tokens > 0) {
        Some(usage)
    } else {
        None
    }
}

/// Extract every qualifying usage from an OTEL logs payload
pub fn extract_usage(payload: &Value) -> Extraction {
    let mut extraction = Extraction::default();
    for record in log_records(payload) {
        extraction.records_seen += 1;
        if let Some(usage) = parse_record(record) {
            extraction.usages.push(usage);
        }
    }
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn int_attr(key: &str, value: i64) -> Value {
        json!({"key": key, "value": {"intValue": value}})
    }

    fn str_attr(key: &str, value: &str) -> Value {
        json!({"key": key, "value": {"stringValue": value}})
    }

    fn payload(records: Vec<Value>) -> Value {
        json!({
            "resourceLogs": [{
                "scopeLogs": [{
                    "logRecords": records
                }]
            }]
        })
    }

    fn record(attributes: Vec<Value>) -> Value {
        json!({"body": {"stringValue": "claude_code.api_request"}, "attributes": attributes})
    }

    #[test]
    fn test_cache_read_excluded_from_input() {
        let p = payload(vec![record(vec![
            str_attr("event.name", "api_request"),
            int_attr("input_tokens", 100),
            int_attr("cache_creation_tokens", 50),
            int_attr("cache_read_tokens", 9999),
            int_attr("output_tokens", 20),
            str_attr("model", "claude-sonnet-4"),
        ])]);

        let extraction = extract_usage(&p);
        assert_eq!(extraction.usages.len(), 1);

        let session = extraction.usages[0].to_session();
        assert_eq!(session.input, 150);
        assert_eq!(session.output, 20);
        assert_eq!(session.note, "auto: claude-sonnet-4");
    }

    #[test]
    fn test_zero_tokens_yield_nothing() {
        let p = payload(vec![record(vec![
            str_attr("event.name", "api_request"),
            int_attr("input_tokens", 0),
            int_attr("output_tokens", 0),
            int_attr("cache_creation_tokens", 500),
        ])]);

        let extraction = extract_usage(&p);
        assert!(extraction.usages.is_empty());
        assert_eq!(extraction.records_seen, 1);
        assert_eq!(extraction.skipped(), 1);
    }

    #[test]
    fn test_other_events_yield_nothing() {
        let missing_name = record(vec![int_attr("input_tokens", 10), int_attr("output_tokens", 10)]);
        let other_name = record(vec![
            str_attr("event.name", "tool_result"),
            int_attr("input_tokens", 10),
        ]);

        let extraction = extract_usage(&payload(vec![missing_name, other_name]));
        assert!(extraction.usages.is_empty());
        assert_eq!(extraction.records_seen, 2);
    }

    #[test]
    fn test_note_without_model() {
        let p = payload(vec![record(vec![
            str_attr("event.name", "api_request"),
            int_attr("output_tokens", 7),
        ])]);

        let usage = &extract_usage(&p).usages[0];
        assert_eq!(usage.note(), "auto");
        assert_eq!(usage.quota_input(), 0);
    }

    #[test]
    fn test_string_encoded_int_values() {
        // OTLP/JSON encodes int64 as strings
        let p = payload(vec![record(vec![
            str_attr("event.name", "api_request"),
            json!({"key": "input_tokens", "value": {"intValue": "1200"}}),
            json!({"key": "output_tokens", "value": {"stringValue": "34"}}),
            json!({"key": "cache_creation_tokens", "value": {"doubleValue": 6.0}}),
        ])]);

        let usage = &extract_usage(&p).usages[0];
        assert_eq!(usage.input_tokens, 1200);
        assert_eq!(usage.output_tokens, 34);
        assert_eq!(usage.quota_input(), 1206);
    }

    #[test]
    fn test_resolution_order_and_zero_quirk() {
        let v = json!({"intValue": 0, "stringValue": "fallback"});
        assert_eq!(AnyValue::from_json(&v).resolve(), Scalar::Text("fallback".into()));

        let v = json!({"intValue": 5, "stringValue": "ignored"});
        assert_eq!(AnyValue::from_json(&v).resolve(), Scalar::Int(5));

        let v = json!({"intValue": "", "stringValue": "", "doubleValue": 0.5});
        assert_eq!(AnyValue::from_json(&v).resolve(), Scalar::Double(0.5));

        let v = json!({});
        assert_eq!(AnyValue::from_json(&v).resolve(), Scalar::Int(0));
    }

    #[test]
    fn test_null_double_value_resolves_to_zero() {
        let v = json!({"stringValue": "", "doubleValue": null});
        assert_eq!(AnyValue::from_json(&v).resolve(), Scalar::Int(0));

        let p = payload(vec![record(vec![
            str_attr("event.name", "api_request"),
            int_attr("output_tokens", 4),
            json!({"key": "model", "value": {"doubleValue": null}}),
        ])]);
        assert_eq!(extract_usage(&p).usages[0].note(), "auto: 0");
    }

    #[test]
    fn test_malformed_shapes_are_empty() {
        for p in [
            json!({}),
            json!({"resourceLogs": "nope"}),
            json!({"resourceLogs": [{"scopeLogs": {}}]}),
            json!({"resourceLogs": [{"scopeLogs": [{"logRecords": null}]}]}),
            json!({"resourceLogs": [{"scopeLogs": [{"logRecords": [{"attributes": 3}]}]}]}),
            json!([1, 2, 3]),
        ] {
            assert!(extract_usage(&p).usages.is_empty(), "payload {p}");
        }
    }

    #[test]
    fn test_traversal_order_is_document_order() {
        let p = json!({
            "resourceLogs": [
                {"scopeLogs": [
                    {"logRecords": [record(vec![str_attr("event.name", "api_request"), int_attr("input_tokens", 1)])]},
                    {"logRecords": [record(vec![str_attr("event.name", "api_request"), int_attr("input_tokens", 2)])]}
                ]},
                {"scopeLogs": [
                    {"logRecords": [record(vec![str_attr("event.name", "api_request"), int_attr("input_tokens", 3)])]}
                ]}
            ]
        });

        let inputs: Vec<i64> = extract_usage(&p).usages.iter().map(|u| u.input_tokens).collect();
        assert_eq!(inputs, vec![1, 2, 3]);
    }

    #[test]
    fn test_attributes_without_key_are_ignored() {
        let p = payload(vec![record(vec![
            json!({"value": {"stringValue": "api_request"}}),
            str_attr("event.name", "api_request"),
            json!("garbage"),
            int_attr("input_tokens", 3),
        ])]);

        assert_eq!(extract_usage(&p).usages.len(), 1);
    }
}
