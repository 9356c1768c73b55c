//! Session ledger: document-level operations plus the lock that makes each
//! Load→mutate→Save sequence atomic with respect to concurrent requests.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::metrics;
use crate::models::coerce::coerce_int;
use crate::models::{SessionRecord, UsageDocument};
use crate::otel;
use crate::store::{StoreError, UsageStore};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Delete index absent, negative, non-integer or out of range
    #[error("Invalid index")]
    InvalidIndex,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Append a record to the end of `sessions`
pub fn append_session(doc: &mut UsageDocument, record: SessionRecord) {
    doc.sessions.push(record);
}

/// Remove the record at a 0-based position. The document is left untouched
/// on error.
pub fn delete_session(
    doc: &mut UsageDocument,
    index: Option<&Value>,
) -> Result<SessionRecord, LedgerError> {
    let index = index
        .and_then(Value::as_i64)
        .filter(|i| *i >= 0)
        .and_then(|i| usize::try_from(i).ok())
        .filter(|i| *i < doc.sessions.len())
        .ok_or(LedgerError::InvalidIndex)?;

    Ok(doc.sessions.remove(index))
}

/// Append an arbitrary client payload to `calibrations`, creating the list
/// on first use.
pub fn append_calibration(doc: &mut UsageDocument, payload: Value) {
    doc.calibrations.get_or_insert_with(Vec::new).push(payload);
}

/// Keys of a settings patch that were applied or rejected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOutcome {
    pub applied: Vec<&'static str>,
    pub rejected: Vec<&'static str>,
}

/// Merge `limit` and `resetDay` from a patch, coercing to integer. Other keys
/// are ignored; values that cannot be coerced leave the field unchanged.
pub fn update_settings(doc: &mut UsageDocument, patch: &Value) -> SettingsOutcome {
    let mut outcome = SettingsOutcome::default();

    if let Some(raw) = patch.get("limit") {
        match coerce_int(raw) {
            Some(limit) => {
                doc.limit = Some(limit);
                outcome.applied.push("limit");
            }
            None => outcome.rejected.push("limit"),
        }
    }

    if let Some(raw) = patch.get("resetDay") {
        match coerce_int(raw) {
            Some(day) => {
                doc.reset_day = day;
                outcome.applied.push("resetDay");
            }
            None => outcome.rejected.push("resetDay"),
        }
    }

    outcome
}

/// Serializes all access to a [`UsageStore`].
///
/// Every public method holds one lock across its whole Load→Save sequence,
/// so concurrent handlers never lose each other's writes.
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    lock: Mutex<()>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Store I/O is blocking, so it runs on the blocking pool while the
    /// async lock is held.
    async fn load(&self) -> Result<UsageDocument, StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| Err(e.into()))
            .inspect_err(|e| {
                metrics::record_store_error("load");
                warn!("Failed to load usage document: {}", e);
            })
    }

    async fn save(&self, doc: UsageDocument) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&doc))
            .await
            .unwrap_or_else(|e| Err(e.into()))
            .inspect_err(|e| {
                metrics::record_store_error("save");
                warn!("Failed to save usage document: {}", e);
            })
    }

    /// Current persisted document
    pub async fn snapshot(&self) -> Result<UsageDocument, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Record a manually entered session
    pub async fn record_session(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        append_session(&mut doc, record.clone());
        self.save(doc).await?;

        metrics::record_session("manual", &record);
        info!(
            input = record.input,
            output = record.output,
            "Recorded manual session"
        );
        Ok(record)
    }

    /// Ingest an OTEL logs payload.
    ///
    /// Each qualifying record gets its own Load→append→Save cycle so that
    /// records already written survive a failure later in the batch.
    pub async fn ingest_otel(&self, payload: &Value) -> Result<Vec<SessionRecord>, StoreError> {
        let extraction = otel::extract_usage(payload);
        metrics::record_otel_records(extraction.usages.len(), extraction.skipped());

        let mut added = Vec::with_capacity(extraction.usages.len());
        for usage in &extraction.usages {
            let record = usage.to_session();

            let _guard = self.lock.lock().await;
            let mut doc = self.load().await?;
            append_session(&mut doc, record.clone());
            self.save(doc).await?;

            metrics::record_session("otel", &record);
            added.push(record);
        }

        if extraction.records_seen > 0 {
            info!(
                records = extraction.records_seen,
                sessions_added = added.len(),
                "Ingested OTEL logs batch"
            );
        }
        Ok(added)
    }

    /// Delete the session at `index`
    pub async fn delete_session(&self, index: Option<&Value>) -> Result<SessionRecord, LedgerError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let removed = delete_session(&mut doc, index)?;
        self.save(doc).await?;

        metrics::record_session_deleted();
        info!(note = %removed.note, timestamp = %removed.timestamp, "Deleted session");
        Ok(removed)
    }

    /// Append a calibration payload
    pub async fn add_calibration(&self, payload: Value) -> Result<Value, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        append_calibration(&mut doc, payload.clone());
        self.save(doc).await?;

        info!("Recorded calibration");
        Ok(payload)
    }

    /// Apply a settings patch
    pub async fn update_settings(&self, patch: &Value) -> Result<SettingsOutcome, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let outcome = update_settings(&mut doc, patch);
        self.save(doc).await?;

        if !outcome.rejected.is_empty() {
            warn!(keys = ?outcome.rejected, "Ignored non-integer settings values");
        }
        info!(keys = ?outcome.applied, "Updated settings");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store whose `fail_on`-th save (1-based) returns an I/O error
    struct FlakyStore {
        inner: MemoryStore,
        saves: AtomicUsize,
        fail_on: usize,
    }

    impl UsageStore for FlakyStore {
        fn load(&self) -> Result<UsageDocument, StoreError> {
            self.inner.load()
        }

        fn save(&self, doc: &UsageDocument) -> Result<(), StoreError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Io {
                    path: "usage.json".into(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save(doc)
        }

        fn exists(&self) -> bool {
            self.inner.exists()
        }
    }

    fn doc_with_sessions(n: i64) -> UsageDocument {
        let mut doc = UsageDocument::default();
        for i in 0..n {
            doc.sessions.push(SessionRecord::new(i, i, format!("s{}", i)));
        }
        doc
    }

    fn notes(doc: &UsageDocument) -> Vec<String> {
        doc.sessions.iter().map(|s| s.note.clone()).collect()
    }

    #[test]
    fn test_delete_every_valid_index() {
        for i in 0..4 {
            let mut doc = doc_with_sessions(4);
            let before = doc.sessions.clone();

            let removed = delete_session(&mut doc, Some(&json!(i))).unwrap();

            assert_eq!(removed, before[i as usize]);
            assert_eq!(doc.sessions.len(), 3);
            let mut expected = before.clone();
            expected.remove(i as usize);
            assert_eq!(doc.sessions, expected);
        }
    }

    #[test]
    fn test_delete_invalid_index_leaves_document_unchanged() {
        for index in [None, Some(json!(-1)), Some(json!(3)), Some(json!(99)), Some(json!("0")), Some(json!(1.5))] {
            let mut doc = doc_with_sessions(3);
            let before = doc.clone();

            let err = delete_session(&mut doc, index.as_ref()).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidIndex));
            assert_eq!(doc, before);
        }
    }

    #[test]
    fn test_append_calibration_creates_list() {
        let mut doc = UsageDocument::default();
        assert!(doc.calibrations.is_none());

        append_calibration(&mut doc, json!({"pct": 12}));
        append_calibration(&mut doc, json!([1, 2]));

        assert_eq!(doc.calibrations, Some(vec![json!({"pct": 12}), json!([1, 2])]));
    }

    #[test]
    fn test_update_settings_reset_day_only() {
        let mut doc = doc_with_sessions(2);
        let before = doc.clone();

        let outcome = update_settings(&mut doc, &json!({"resetDay": 15}));

        assert_eq!(outcome.applied, vec!["resetDay"]);
        assert_eq!(doc.reset_day, 15);
        assert_eq!(doc.monthly_limit, before.monthly_limit);
        assert_eq!(doc.weekly_limit, before.weekly_limit);
        assert_eq!(doc.sessions, before.sessions);
        assert_eq!(doc.limit, None);
    }

    #[test]
    fn test_update_settings_limit_and_unknown_keys() {
        let mut doc = UsageDocument::default();

        let outcome = update_settings(&mut doc, &json!({"limit": "5000", "monthlyLimit": 1, "resetDay": null}));

        assert_eq!(doc.limit, Some(5000));
        assert_eq!(doc.monthly_limit, UsageDocument::default().monthly_limit);
        assert_eq!(doc.reset_day, 1);
        assert_eq!(outcome.applied, vec!["limit"]);
        assert_eq!(outcome.rejected, vec!["resetDay"]);
    }

    #[tokio::test]
    async fn test_ledger_records_and_deletes() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new(UsageDocument::default())));

        ledger.record_session(SessionRecord::new(10, 5, "a")).await.unwrap();
        ledger.record_session(SessionRecord::new(20, 6, "b")).await.unwrap();
        ledger.record_session(SessionRecord::new(30, 7, "c")).await.unwrap();

        let removed = ledger.delete_session(Some(&json!(1))).await.unwrap();
        assert_eq!(removed.note, "b");
        assert_eq!(notes(&ledger.snapshot().await.unwrap()), vec!["a", "c"]);

        let err = ledger.delete_session(Some(&json!(2))).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidIndex));
        assert_eq!(ledger.snapshot().await.unwrap().sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_otel_appends_each_record() {
        let store = Arc::new(MemoryStore::new(UsageDocument::default()));
        let ledger = UsageLedger::new(store.clone());

        let payload = json!({
            "resourceLogs": [{"scopeLogs": [{"logRecords": [
                {"attributes": [
                    {"key": "event.name", "value": {"stringValue": "api_request"}},
                    {"key": "input_tokens", "value": {"intValue": 100}},
                    {"key": "output_tokens", "value": {"intValue": 20}}
                ]},
                {"attributes": [
                    {"key": "event.name", "value": {"stringValue": "user_prompt"}}
                ]},
                {"attributes": [
                    {"key": "event.name", "value": {"stringValue": "api_request"}},
                    {"key": "output_tokens", "value": {"intValue": 3}},
                    {"key": "model", "value": {"stringValue": "haiku"}}
                ]}
            ]}]}]
        });

        let added = ledger.ingest_otel(&payload).await.unwrap();
        assert_eq!(added.len(), 2);

        let doc = store.load().unwrap();
        assert_eq!(notes(&doc), vec!["auto", "auto: haiku"]);
        assert_eq!(doc.sessions[0].input, 100);
    }

    #[tokio::test]
    async fn test_ingest_failure_keeps_records_already_written() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(UsageDocument::default()),
            saves: AtomicUsize::new(0),
            fail_on: 2,
        });
        let ledger = UsageLedger::new(store.clone());

        let api_request = |input: i64| {
            json!({"attributes": [
                {"key": "event.name", "value": {"stringValue": "api_request"}},
                {"key": "input_tokens", "value": {"intValue": input}}
            ]})
        };
        let payload = json!({
            "resourceLogs": [{"scopeLogs": [{"logRecords": [
                api_request(1), api_request(2), api_request(3)
            ]}]}]
        });

        let err = ledger.ingest_otel(&payload).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));

        let doc = store.load().unwrap();
        assert_eq!(doc.sessions.len(), 1);
        assert_eq!(doc.sessions[0].input, 1);
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let ledger = Arc::new(UsageLedger::new(Arc::new(MemoryStore::new(UsageDocument::default()))));

        let mut handles = Vec::new();
        for i in 0..32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .record_session(SessionRecord::new(i, i, "concurrent"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ledger.snapshot().await.unwrap().sessions.len(), 32);
    }
}
