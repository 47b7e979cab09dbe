// ABOUTME: Append-only sync log - one row per synchronization pass
// ABOUTME: Entries transition started -> completed|failed exactly once and are never deleted

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::records::parse_remote_timestamp;

/// One synchronization pass as recorded in the log.
#[derive(Debug, Clone)]
pub struct SyncLogEntry {
    pub id: i64,
    pub entity_type: String,
    pub sync_mode: String,
    pub status: String,
    pub records_processed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_deleted: u64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct SyncLogStore<'a> {
    conn: &'a Connection,
}

impl<'a> SyncLogStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS sync_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_type TEXT NOT NULL,
                    sync_mode TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'started',
                    records_processed INTEGER NOT NULL DEFAULT 0,
                    records_created INTEGER NOT NULL DEFAULT 0,
                    records_updated INTEGER NOT NULL DEFAULT 0,
                    records_deleted INTEGER NOT NULL DEFAULT 0,
                    error_message TEXT,
                    started_at TEXT NOT NULL,
                    finished_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_sync_logs_entity
                    ON sync_logs (entity_type, status, started_at);",
            )
            .context("Failed to create sync_logs table")?;
        Ok(())
    }

    /// Record the start of a pass, returning the new entry's id.
    pub fn begin(&self, entity: &str, mode: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_logs (entity_type, sync_mode, status, started_at)
                 VALUES (?1, ?2, 'started', ?3)",
                params![entity, mode, Utc::now().to_rfc3339()],
            )
            .context("Failed to insert sync log entry")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Finalize a pass as completed with its counters.
    pub fn complete(
        &self,
        id: i64,
        processed: u64,
        created: u64,
        updated: u64,
        deleted: u64,
    ) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_logs
                 SET status = 'completed', finished_at = ?2,
                     records_processed = ?3, records_created = ?4,
                     records_updated = ?5, records_deleted = ?6
                 WHERE id = ?1 AND status = 'started'",
                params![
                    id,
                    Utc::now().to_rfc3339(),
                    processed as i64,
                    created as i64,
                    updated as i64,
                    deleted as i64
                ],
            )
            .context("Failed to complete sync log entry")?;
        if affected == 0 {
            anyhow::bail!("Sync log entry {} was already finalized", id);
        }
        Ok(())
    }

    /// Finalize a pass as failed with its error message.
    pub fn fail(&self, id: i64, error_message: &str) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_logs
                 SET status = 'failed', finished_at = ?2, error_message = ?3
                 WHERE id = ?1 AND status = 'started'",
                params![id, Utc::now().to_rfc3339(), error_message],
            )
            .context("Failed to mark sync log entry failed")?;
        if affected == 0 {
            anyhow::bail!("Sync log entry {} was already finalized", id);
        }
        Ok(())
    }

    /// The most recent completed pass for an entity type, if any.
    pub fn latest_completed(&self, entity: &str) -> Result<Option<SyncLogEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM sync_logs
                     WHERE entity_type = ?1 AND status = 'completed'
                     ORDER BY started_at DESC, id DESC LIMIT 1",
                    ENTRY_COLUMNS
                ),
                params![entity],
                entry_from_row,
            )
            .optional()
            .context("Failed to query latest completed sync")?
            .map(|raw| raw.into_entry())
            .transpose()
    }

    /// Recent passes for an entity type, newest first.
    pub fn recent(&self, entity: &str, limit: u32) -> Result<Vec<SyncLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM sync_logs
                 WHERE entity_type = ?1
                 ORDER BY started_at DESC, id DESC LIMIT ?2",
                ENTRY_COLUMNS
            ))
            .context("Failed to prepare sync log query")?;

        let rows = stmt
            .query_map(params![entity, limit], entry_from_row)
            .context("Failed to query sync logs")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read sync log rows")?;

        rows.into_iter().map(|raw| raw.into_entry()).collect()
    }

    /// The entry with the given id. Used by tests and the status surface.
    pub fn get(&self, id: i64) -> Result<Option<SyncLogEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sync_logs WHERE id = ?1", ENTRY_COLUMNS),
                params![id],
                entry_from_row,
            )
            .optional()
            .context("Failed to query sync log entry")?
            .map(|raw| raw.into_entry())
            .transpose()
    }
}

const ENTRY_COLUMNS: &str = "id, entity_type, sync_mode, status, records_processed, \
     records_created, records_updated, records_deleted, error_message, started_at, finished_at";

struct RawEntry {
    id: i64,
    entity_type: String,
    sync_mode: String,
    status: String,
    processed: i64,
    created: i64,
    updated: i64,
    deleted: i64,
    error_message: Option<String>,
    started_at: String,
    finished_at: Option<String>,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        sync_mode: row.get(2)?,
        status: row.get(3)?,
        processed: row.get(4)?,
        created: row.get(5)?,
        updated: row.get(6)?,
        deleted: row.get(7)?,
        error_message: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

impl RawEntry {
    fn into_entry(self) -> Result<SyncLogEntry> {
        let started_at = parse_remote_timestamp(&self.started_at)
            .ok_or_else(|| anyhow::anyhow!("Corrupt started_at in sync log {}", self.id))?;
        let finished_at = match self.finished_at {
            Some(raw) => Some(
                parse_remote_timestamp(&raw)
                    .ok_or_else(|| anyhow::anyhow!("Corrupt finished_at in sync log {}", self.id))?,
            ),
            None => None,
        };
        Ok(SyncLogEntry {
            id: self.id,
            entity_type: self.entity_type,
            sync_mode: self.sync_mode,
            status: self.status,
            records_processed: self.processed as u64,
            records_created: self.created as u64,
            records_updated: self.updated as u64,
            records_deleted: self.deleted as u64,
            error_message: self.error_message,
            started_at,
            finished_at,
        })
    }
}
