// ABOUTME: Local SQLite database access for crm-replicator
// ABOUTME: Opens the store file and bootstraps the sync_logs and per-entity record tables

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::store::records::RecordStore;
use crate::store::sync_log::SyncLogStore;

/// Open (or create) the local replica database.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    // WAL keeps a status query from blocking behind a running pass
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable WAL mode")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("Failed to set busy timeout")?;

    Ok(conn)
}

/// Create the sync_logs table and one record table per configured entity.
/// Idempotent.
pub fn bootstrap(conn: &Connection, entities: &[String]) -> Result<()> {
    SyncLogStore::new(conn).ensure_schema()?;
    for entity in entities {
        RecordStore::new(conn, entity)?.ensure_schema()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("replica.db");
        let conn = open_database(&path).unwrap();
        bootstrap(&conn, &["Lead".to_string()]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let entities = vec!["Lead".to_string(), "Contact".to_string()];
        bootstrap(&conn, &entities).unwrap();
        bootstrap(&conn, &entities).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name LIKE '%_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
