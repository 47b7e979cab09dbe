// ABOUTME: Sync engine - runs one synchronization pass against the remote CRM
// ABOUTME: Decides full vs incremental, computes the watermark, reconciles records, logs the pass

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use rusqlite::Connection;
use std::fmt;

use crate::remote::models::RemoteRecord;
use crate::store::records::{RecordStore, UpsertOutcome, PROJECTED_FIELDS};
use crate::store::sync_log::SyncLogStore;
use crate::sync::lease::LeaseRegistry;

/// Safety buffer subtracted from the last successful start time when computing
/// the incremental watermark. Absorbs replication lag and boundary races at
/// the remote source.
pub const WATERMARK_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl SyncOutcome {
    /// Fold another pass's counters into this one (daemon cycle totals).
    pub fn absorb(&mut self, other: &SyncOutcome) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} created, {} updated, {} deleted",
            self.processed, self.created, self.updated, self.deleted
        )
    }
}

/// The remote CRM as the engine sees it. Deletion detection is an optional
/// capability; `fetch_deleted` is only called when `supports_deletes` is true.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_all(&self, entity: &str, fields: &[&str]) -> Result<Vec<RemoteRecord>>;

    /// Records modified at or after `since`, ordered by modification time
    /// ascending so an interrupted pass reprocesses the least on retry.
    async fn fetch_updated_since(
        &self,
        entity: &str,
        since: DateTime<Utc>,
        fields: &[&str],
    ) -> Result<Vec<RemoteRecord>>;

    fn supports_deletes(&self) -> bool;

    async fn fetch_deleted(
        &self,
        entity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub entity: String,
    /// Propagate remote deletions in incremental passes. Only effective when
    /// the source also supports the deleted-records query.
    pub detect_deletes: bool,
}

/// Orchestrates one synchronization pass: watermark, fetch, reconcile, log.
pub struct SyncEngine<'a, S> {
    source: &'a S,
    conn: &'a Connection,
    leases: &'a LeaseRegistry,
    options: EngineOptions,
}

impl<'a, S: RemoteSource> SyncEngine<'a, S> {
    pub fn new(
        source: &'a S,
        conn: &'a Connection,
        leases: &'a LeaseRegistry,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            conn,
            leases,
            options,
        }
    }

    /// Run one pass. Exactly one sync log entry records the outcome; a fetch
    /// failure marks it failed and propagates. Rejected triggers (lease held)
    /// fail before any log entry is written.
    pub async fn run(&self, mode: SyncMode) -> Result<SyncOutcome> {
        let entity = self.options.entity.clone();
        let _lease = self.leases.acquire(&entity)?;

        let records = RecordStore::new(self.conn, &entity)?;
        records.ensure_schema()?;
        let logs = SyncLogStore::new(self.conn);
        logs.ensure_schema()?;

        let log_id = logs.begin(&entity, mode.as_str())?;
        tracing::info!("Starting {} sync for {} (log entry {})", mode, entity, log_id);

        let result = match mode {
            SyncMode::Full => self.full_pass(&records).await,
            SyncMode::Incremental => self.incremental_pass(&records, &logs).await,
        };

        match result {
            Ok(outcome) => {
                logs.complete(
                    log_id,
                    outcome.processed,
                    outcome.created,
                    outcome.updated,
                    outcome.deleted,
                )?;
                tracing::info!("Sync for {} completed: {}", entity, outcome);
                Ok(outcome)
            }
            Err(e) => {
                // {:#} keeps the context chain in the recorded message
                logs.fail(log_id, &format!("{:#}", e))?;
                tracing::error!("Sync for {} failed: {:#}", entity, e);
                Err(e)
            }
        }
    }

    /// Fetch the complete remote set and reconcile it. No deletion detection.
    async fn full_pass(&self, records: &RecordStore<'_>) -> Result<SyncOutcome> {
        let fetched = self
            .source
            .fetch_all(&self.options.entity, PROJECTED_FIELDS)
            .await?;
        Ok(self.apply_records(records, &fetched))
    }

    /// Fetch records modified since the watermark, then deletions in the same
    /// window when the capability is enabled and present. Without a completed
    /// baseline this downgrades to a full pass.
    async fn incremental_pass(
        &self,
        records: &RecordStore<'_>,
        logs: &SyncLogStore<'_>,
    ) -> Result<SyncOutcome> {
        let entity = &self.options.entity;

        let Some(baseline) = logs.latest_completed(entity)? else {
            tracing::info!(
                "No completed sync for {} yet, falling back to a full pass",
                entity
            );
            return self.full_pass(records).await;
        };

        let watermark = baseline.started_at - Duration::minutes(WATERMARK_BUFFER_MINUTES);
        let window_end = Utc::now();
        tracing::debug!("Incremental sync for {} from watermark {}", entity, watermark);

        let fetched = self
            .source
            .fetch_updated_since(entity, watermark, PROJECTED_FIELDS)
            .await?;
        let mut outcome = self.apply_records(records, &fetched);

        if self.options.detect_deletes && self.source.supports_deletes() {
            let deleted_ids = self
                .source
                .fetch_deleted(entity, watermark, window_end)
                .await?;
            outcome.processed += deleted_ids.len() as u64;

            for remote_id in &deleted_ids {
                match records.mark_deleted(remote_id) {
                    Ok(true) => outcome.deleted += 1,
                    Ok(false) => {
                        tracing::debug!("Deletion of unknown record {} ignored", remote_id)
                    }
                    Err(e) => {
                        tracing::warn!("Skipping deletion of record {}: {:#}", remote_id, e)
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Upsert every fetched record. Per-record failures are logged and skipped;
    /// `processed` counts every fetched record regardless.
    fn apply_records(&self, records: &RecordStore<'_>, fetched: &[RemoteRecord]) -> SyncOutcome {
        let mut outcome = SyncOutcome {
            processed: fetched.len() as u64,
            ..Default::default()
        };

        for record in fetched {
            match records.upsert(record) {
                Ok(UpsertOutcome::Created) => outcome.created += 1,
                Ok(UpsertOutcome::Updated) => outcome.updated += 1,
                Err(e) => {
                    let id = record.id().unwrap_or("<no id>");
                    tracing::warn!(
                        "Skipping {} record {}: {:#}",
                        self.options.entity,
                        id,
                        e
                    );
                }
            }
        }

        outcome
    }
}
