// ABOUTME: Integration tests for the sync engine against a scripted remote source
// ABOUTME: Covers full/incremental passes, watermarks, soft deletes, and failure recording

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::sync::Mutex;

use crm_replicator::remote::models::RemoteRecord;
use crm_replicator::store::records::RecordStore;
use crm_replicator::store::sync_log::SyncLogStore;
use crm_replicator::sync::{
    EngineOptions, LeaseRegistry, RemoteSource, SyncEngine, SyncMode, SyncOutcome,
};

/// Remote source with canned responses that records the arguments it was
/// called with.
#[derive(Default)]
struct ScriptedSource {
    records: Vec<RemoteRecord>,
    deleted: Vec<String>,
    supports_deletes: bool,
    fail_fetch: bool,
    captured_since: Mutex<Option<DateTime<Utc>>>,
    captured_window: Mutex<Option<(DateTime<Utc>, DateTime<Utc>)>>,
    full_fetches: Mutex<u32>,
}

impl ScriptedSource {
    fn with_records(records: Vec<RemoteRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    async fn fetch_all(&self, _entity: &str, _fields: &[&str]) -> Result<Vec<RemoteRecord>> {
        if self.fail_fetch {
            anyhow::bail!("CRM request failed: connection refused");
        }
        *self.full_fetches.lock().unwrap() += 1;
        Ok(self.records.clone())
    }

    async fn fetch_updated_since(
        &self,
        _entity: &str,
        since: DateTime<Utc>,
        _fields: &[&str],
    ) -> Result<Vec<RemoteRecord>> {
        if self.fail_fetch {
            anyhow::bail!("CRM request failed: connection refused");
        }
        *self.captured_since.lock().unwrap() = Some(since);
        Ok(self.records.clone())
    }

    fn supports_deletes(&self) -> bool {
        self.supports_deletes
    }

    async fn fetch_deleted(
        &self,
        _entity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        *self.captured_window.lock().unwrap() = Some((start, end));
        Ok(self.deleted.clone())
    }
}

fn lead(id: &str, name: &str) -> RemoteRecord {
    serde_json::from_value(json!({"Id": id, "Name": name})).unwrap()
}

fn database() -> Connection {
    Connection::open_in_memory().unwrap()
}

async fn run_pass(
    conn: &Connection,
    source: &ScriptedSource,
    mode: SyncMode,
    detect_deletes: bool,
) -> Result<SyncOutcome> {
    let leases = LeaseRegistry::new();
    let engine = SyncEngine::new(
        source,
        conn,
        &leases,
        EngineOptions {
            entity: "Lead".to_string(),
            detect_deletes,
        },
    );
    engine.run(mode).await
}

#[tokio::test]
async fn test_full_sync_from_empty_store() {
    let conn = database();
    let source = ScriptedSource::with_records(vec![
        lead("L1", "Ada"),
        lead("L2", "Grace"),
        lead("L3", "Edsger"),
    ]);

    let outcome = run_pass(&conn, &source, SyncMode::Full, true).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome {
            processed: 3,
            created: 3,
            updated: 0,
            deleted: 0,
        }
    );

    let records = RecordStore::new(&conn, "Lead").unwrap();
    assert_eq!(records.count_active().unwrap(), 3);

    let entry = SyncLogStore::new(&conn)
        .latest_completed("Lead")
        .unwrap()
        .unwrap();
    assert_eq!(entry.sync_mode, "full");
    assert_eq!(entry.status, "completed");
    assert_eq!(entry.records_processed, 3);
    assert_eq!(entry.records_created, 3);
    assert!(entry.finished_at.is_some());
    assert!(entry.error_message.is_none());
}

#[tokio::test]
async fn test_full_sync_twice_is_idempotent() {
    let conn = database();
    let source = ScriptedSource::with_records(vec![
        lead("L1", "Ada"),
        lead("L2", "Grace"),
        lead("L3", "Edsger"),
    ]);

    run_pass(&conn, &source, SyncMode::Full, true).await.unwrap();
    let second = run_pass(&conn, &source, SyncMode::Full, true).await.unwrap();

    assert_eq!(
        second,
        SyncOutcome {
            processed: 3,
            created: 0,
            updated: 3,
            deleted: 0,
        }
    );
    let records = RecordStore::new(&conn, "Lead").unwrap();
    assert_eq!(records.count_active().unwrap(), 3);
}

#[tokio::test]
async fn test_incremental_without_baseline_falls_back_to_full() {
    let conn = database();
    let source = ScriptedSource::with_records(vec![lead("L1", "Ada"), lead("L2", "Grace")]);

    let outcome = run_pass(&conn, &source, SyncMode::Incremental, true)
        .await
        .unwrap();
    assert_eq!(outcome.created, 2);

    // The full fetch ran; the incremental query was never issued
    assert_eq!(*source.full_fetches.lock().unwrap(), 1);
    assert!(source.captured_since.lock().unwrap().is_none());

    // The log records the requested mode, not the downgraded fetch
    let entry = SyncLogStore::new(&conn)
        .latest_completed("Lead")
        .unwrap()
        .unwrap();
    assert_eq!(entry.sync_mode, "incremental");

    let records = RecordStore::new(&conn, "Lead").unwrap();
    assert_eq!(records.count_active().unwrap(), 2);
}

#[tokio::test]
async fn test_incremental_watermark_is_baseline_start_minus_buffer() {
    let conn = database();
    let source = ScriptedSource::with_records(vec![lead("L1", "Ada")]);

    run_pass(&conn, &source, SyncMode::Full, true).await.unwrap();
    let baseline = SyncLogStore::new(&conn)
        .latest_completed("Lead")
        .unwrap()
        .unwrap();

    run_pass(&conn, &source, SyncMode::Incremental, false)
        .await
        .unwrap();

    // A record modified 2 minutes before the baseline start is still inside
    // this window, which is the point of the buffer
    let since = source.captured_since.lock().unwrap().unwrap();
    assert_eq!(since, baseline.started_at - Duration::minutes(5));
    assert!(since < baseline.started_at - Duration::minutes(2));
}

#[tokio::test]
async fn test_incremental_soft_deletes_reported_deletions() {
    let conn = database();
    let seed = ScriptedSource::with_records(vec![
        lead("L1", "Ada"),
        lead("L2", "Grace"),
        lead("L3", "Edsger"),
    ]);
    run_pass(&conn, &seed, SyncMode::Full, true).await.unwrap();
    let baseline = SyncLogStore::new(&conn)
        .latest_completed("Lead")
        .unwrap()
        .unwrap();

    let source = ScriptedSource {
        deleted: vec!["L2".to_string(), "L999".to_string()],
        supports_deletes: true,
        ..Default::default()
    };
    let outcome = run_pass(&conn, &source, SyncMode::Incremental, true)
        .await
        .unwrap();

    // Both deletion identifiers are processed; only the known one counts
    assert_eq!(
        outcome,
        SyncOutcome {
            processed: 2,
            created: 0,
            updated: 0,
            deleted: 1,
        }
    );

    let records = RecordStore::new(&conn, "Lead").unwrap();
    assert!(records.find("L2").unwrap().unwrap().is_deleted);
    assert_eq!(records.count_active().unwrap(), 2);

    // The deletion window opens at the watermark and closes at pass time
    let (start, end) = source.captured_window.lock().unwrap().unwrap();
    assert_eq!(start, baseline.started_at - Duration::minutes(5));
    assert!(start < end);
}

#[tokio::test]
async fn test_deletion_detection_requires_source_capability() {
    let conn = database();
    let seed = ScriptedSource::with_records(vec![lead("L1", "Ada")]);
    run_pass(&conn, &seed, SyncMode::Full, true).await.unwrap();

    // Source does not expose the deleted-records query
    let source = ScriptedSource {
        deleted: vec!["L1".to_string()],
        supports_deletes: false,
        ..Default::default()
    };
    let outcome = run_pass(&conn, &source, SyncMode::Incremental, true)
        .await
        .unwrap();

    assert_eq!(outcome.deleted, 0);
    assert!(source.captured_window.lock().unwrap().is_none());
    let records = RecordStore::new(&conn, "Lead").unwrap();
    assert!(!records.find("L1").unwrap().unwrap().is_deleted);
}

#[tokio::test]
async fn test_deletion_detection_honors_config_flag() {
    let conn = database();
    let seed = ScriptedSource::with_records(vec![lead("L1", "Ada")]);
    run_pass(&conn, &seed, SyncMode::Full, true).await.unwrap();

    let source = ScriptedSource {
        deleted: vec!["L1".to_string()],
        supports_deletes: true,
        ..Default::default()
    };
    let outcome = run_pass(&conn, &source, SyncMode::Incremental, false)
        .await
        .unwrap();

    assert_eq!(outcome.deleted, 0);
    assert!(source.captured_window.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_reupsert_clears_soft_delete() {
    let conn = database();
    let seed = ScriptedSource::with_records(vec![lead("L1", "Ada")]);
    run_pass(&conn, &seed, SyncMode::Full, true).await.unwrap();

    let records = RecordStore::new(&conn, "Lead").unwrap();
    assert!(records.mark_deleted("L1").unwrap());
    assert_eq!(records.count_active().unwrap(), 0);

    // The record reappears in a later pass and comes back active
    run_pass(&conn, &seed, SyncMode::Full, true).await.unwrap();
    assert!(!records.find("L1").unwrap().unwrap().is_deleted);
    assert_eq!(records.count_active().unwrap(), 1);
}

#[tokio::test]
async fn test_per_record_failure_does_not_fail_the_pass() {
    let conn = database();
    let bad: RemoteRecord = serde_json::from_value(json!({"Name": "No Id"})).unwrap();
    let source =
        ScriptedSource::with_records(vec![lead("L1", "Ada"), bad, lead("L3", "Edsger")]);

    let outcome = run_pass(&conn, &source, SyncMode::Full, true).await.unwrap();

    // processed counts every fetched record; created undercounts by one
    assert_eq!(
        outcome,
        SyncOutcome {
            processed: 3,
            created: 2,
            updated: 0,
            deleted: 0,
        }
    );

    let entry = SyncLogStore::new(&conn)
        .latest_completed("Lead")
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, "completed");
    assert_eq!(entry.records_processed, 3);
    assert_eq!(entry.records_created, 2);
}

#[tokio::test]
async fn test_fetch_failure_marks_pass_failed_and_propagates() {
    let conn = database();
    let source = ScriptedSource {
        fail_fetch: true,
        ..Default::default()
    };

    let err = run_pass(&conn, &source, SyncMode::Full, true)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection refused"));

    let logs = SyncLogStore::new(&conn);
    let entry = logs.recent("Lead", 1).unwrap().into_iter().next().unwrap();
    assert_eq!(entry.status, "failed");
    assert!(entry.finished_at.is_some());
    assert!(entry
        .error_message
        .as_deref()
        .unwrap()
        .contains("connection refused"));

    // A failed pass is no baseline: the next incremental still downgrades
    assert!(logs.latest_completed("Lead").unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_identifiers_resolve_last_write_wins() {
    let conn = database();
    let source =
        ScriptedSource::with_records(vec![lead("L1", "First"), lead("L1", "Second")]);

    let outcome = run_pass(&conn, &source, SyncMode::Full, true).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome {
            processed: 2,
            created: 1,
            updated: 1,
            deleted: 0,
        }
    );

    let records = RecordStore::new(&conn, "Lead").unwrap();
    let stored = records.find("L1").unwrap().unwrap();
    assert_eq!(stored.name.as_deref(), Some("Second"));
    assert_eq!(records.count_active().unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected_without_log_entry() {
    let conn = database();
    let source = ScriptedSource::with_records(vec![lead("L1", "Ada")]);
    let leases = LeaseRegistry::new();
    let engine = SyncEngine::new(
        &source,
        &conn,
        &leases,
        EngineOptions {
            entity: "Lead".to_string(),
            detect_deletes: true,
        },
    );

    let _held = leases.acquire("Lead").unwrap();
    let err = engine.run(SyncMode::Full).await.unwrap_err();
    assert!(err.to_string().contains("already running"));

    // The rejected trigger never reached the log
    let logs = SyncLogStore::new(&conn);
    logs.ensure_schema().unwrap();
    assert!(logs.recent("Lead", 10).unwrap().is_empty());
}
