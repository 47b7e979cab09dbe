// ABOUTME: RecordStore for synchronized CRM records - one SQLite table per entity type
// ABOUTME: Upserts by remote identifier and soft-deletes rows instead of removing them

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::remote::models::RemoteRecord;

/// The projection of remote fields each record table carries, matching the
/// field list requested from the CRM.
pub const PROJECTED_FIELDS: &[&str] = &[
    "Id",
    "Name",
    "Title",
    "Email",
    "Phone",
    "Company",
    "Status",
    "LeadSource",
    "LastActivityDate",
    "LastModifiedDate",
];

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// A locally stored entity record.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub remote_id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub remote_modified_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate an entity type name before it is embedded in SQL.
///
/// Entity names become table names, so the character set is restricted to
/// identifiers (CRM custom objects like `Invoice__c` stay representable).
pub fn validate_entity_name(entity: &str) -> Result<()> {
    let mut chars = entity.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || entity.len() > 64 {
        anyhow::bail!("Invalid entity name: '{}'", entity);
    }
    Ok(())
}

fn table_name(entity: &str) -> String {
    format!("{}_records", entity.to_lowercase())
}

/// Store for one entity type's records.
pub struct RecordStore<'a> {
    conn: &'a Connection,
    table: String,
}

impl<'a> RecordStore<'a> {
    pub fn new(conn: &'a Connection, entity: &str) -> Result<Self> {
        validate_entity_name(entity)?;
        Ok(Self {
            conn,
            table: table_name(entity),
        })
    }

    /// Create the record table if it does not exist. Idempotent.
    pub fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id TEXT NOT NULL UNIQUE,
                name TEXT,
                title TEXT,
                email TEXT,
                phone TEXT,
                company TEXT,
                status TEXT,
                source TEXT,
                last_activity_at TEXT,
                remote_modified_at TEXT,
                payload TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            self.table
        );
        self.conn
            .execute(&ddl, [])
            .with_context(|| format!("Failed to create table {}", self.table))?;
        Ok(())
    }

    /// Insert the record or overwrite the existing row with the same remote
    /// identifier. Always clears the soft-delete flag: a record seen again is
    /// active, whatever a previous pass marked it.
    pub fn upsert(&self, record: &RemoteRecord) -> Result<UpsertOutcome> {
        let remote_id = record
            .id()
            .ok_or_else(|| anyhow::anyhow!("record payload has no Id field"))?
            .to_string();

        let payload = serde_json::to_string(&record.fields)
            .with_context(|| format!("Failed to serialize payload for record {}", remote_id))?;

        let remote_modified_at = record
            .text_field("LastModifiedDate")
            .and_then(|raw| match parse_remote_timestamp(&raw) {
                Some(ts) => Some(ts),
                None => {
                    tracing::debug!(
                        "Record {} has unparsable LastModifiedDate '{}', keeping previous value",
                        remote_id,
                        raw
                    );
                    None
                }
            })
            .map(|ts| ts.to_rfc3339());
        let last_activity_at = record
            .text_field("LastActivityDate")
            .and_then(|raw| parse_remote_timestamp(&raw))
            .map(|ts| ts.to_rfc3339());

        let now = Utc::now().to_rfc3339();

        let exists: bool = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM \"{}\" WHERE remote_id = ?1", self.table),
                params![remote_id],
                |_| Ok(true),
            )
            .optional()
            .with_context(|| format!("Failed to look up record {}", remote_id))?
            .unwrap_or(false);

        // An unparsable modification timestamp keeps the previous local value,
        // hence the COALESCE on remote_modified_at.
        let sql = format!(
            "INSERT INTO \"{table}\"
                (remote_id, name, title, email, phone, company, status, source,
                 last_activity_at, remote_modified_at, payload, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)
             ON CONFLICT(remote_id) DO UPDATE SET
                name = excluded.name,
                title = excluded.title,
                email = excluded.email,
                phone = excluded.phone,
                company = excluded.company,
                status = excluded.status,
                source = excluded.source,
                last_activity_at = excluded.last_activity_at,
                remote_modified_at = COALESCE(excluded.remote_modified_at, remote_modified_at),
                payload = excluded.payload,
                is_deleted = 0,
                updated_at = excluded.updated_at",
            table = self.table
        );

        self.conn
            .execute(
                &sql,
                params![
                    remote_id,
                    record.text_field("Name"),
                    record.text_field("Title"),
                    record.text_field("Email"),
                    record.text_field("Phone"),
                    record.text_field("Company"),
                    record.text_field("Status"),
                    record.text_field("LeadSource"),
                    last_activity_at,
                    remote_modified_at,
                    payload,
                    now,
                ],
            )
            .with_context(|| format!("Failed to upsert record {}", remote_id))?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    /// Flip the soft-delete flag on a row, reporting whether one existed.
    pub fn mark_deleted(&self, remote_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                &format!(
                    "UPDATE \"{}\" SET is_deleted = 1, updated_at = ?2 WHERE remote_id = ?1",
                    self.table
                ),
                params![remote_id, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to soft-delete record {}", remote_id))?;
        Ok(affected > 0)
    }

    pub fn find(&self, remote_id: &str) -> Result<Option<StoredRecord>> {
        let sql = format!(
            "SELECT remote_id, name, title, email, phone, company, status, source,
                    last_activity_at, remote_modified_at, payload, is_deleted, created_at, updated_at
             FROM \"{}\" WHERE remote_id = ?1",
            self.table
        );

        let raw = self
            .conn
            .query_row(&sql, params![remote_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, bool>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, String>(13)?,
                ))
            })
            .optional()
            .with_context(|| format!("Failed to read record {}", remote_id))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        Ok(Some(StoredRecord {
            remote_id: raw.0,
            name: raw.1,
            title: raw.2,
            email: raw.3,
            phone: raw.4,
            company: raw.5,
            status: raw.6,
            source: raw.7,
            last_activity_at: raw.8.as_deref().and_then(parse_remote_timestamp),
            remote_modified_at: raw.9.as_deref().and_then(parse_remote_timestamp),
            payload: serde_json::from_str(&raw.10)
                .with_context(|| format!("Corrupt payload for record {}", remote_id))?,
            is_deleted: raw.11,
            created_at: parse_remote_timestamp(&raw.12)
                .ok_or_else(|| anyhow::anyhow!("Corrupt created_at for record {}", remote_id))?,
            updated_at: parse_remote_timestamp(&raw.13)
                .ok_or_else(|| anyhow::anyhow!("Corrupt updated_at for record {}", remote_id))?,
        }))
    }

    /// Count rows not marked deleted.
    pub fn count_active(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM \"{}\" WHERE is_deleted = 0", self.table),
                [],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to count active rows in {}", self.table))?;
        Ok(count as u64)
    }
}

/// Parse a remote timestamp. Accepts RFC 3339, the CRM's compact offset form
/// (`2024-03-01T10:00:00.000+0000`), and bare dates (activity dates carry no
/// time component).
pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}
