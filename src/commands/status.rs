// ABOUTME: status command - latest completed pass, recent passes, and active row count

use anyhow::Result;
use std::path::PathBuf;

use crate::config;
use crate::db;
use crate::store::records::RecordStore;
use crate::store::sync_log::{SyncLogEntry, SyncLogStore};

pub struct StatusOptions {
    pub database: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub entity: Option<String>,
    pub limit: u32,
}

pub fn run(opts: StatusOptions) -> Result<()> {
    let sync_config = config::load_sync_config(opts.config_path.as_deref())?;
    let entities = config::resolve_entities(opts.entity, &sync_config)?;
    let database = config::resolve_database(opts.database)?;

    let conn = db::open_database(&database)?;
    db::bootstrap(&conn, &entities)?;
    let logs = SyncLogStore::new(&conn);

    println!("Database: {}", database.display());

    for entity in &entities {
        let records = RecordStore::new(&conn, entity)?;
        println!();
        println!("{}", entity);
        println!("  Active records: {}", records.count_active()?);

        match logs.latest_completed(entity)? {
            Some(entry) => println!("  Last completed:  {}", format_entry(&entry)),
            None => println!("  Last completed:  (never synced)"),
        }

        let recent = logs.recent(entity, opts.limit)?;
        if !recent.is_empty() {
            println!("  Recent passes:");
            for entry in &recent {
                println!("    {}", format_entry(entry));
            }
        }
    }

    Ok(())
}

/// One-line rendering of a sync log entry, shared with the logs command.
pub fn format_entry(entry: &SyncLogEntry) -> String {
    let finished = entry
        .finished_at
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "#{} {} {} started={} finished={} | {} processed, {} created, {} updated, {} deleted",
        entry.id,
        entry.sync_mode,
        entry.status,
        entry.started_at.to_rfc3339(),
        finished,
        entry.records_processed,
        entry.records_created,
        entry.records_updated,
        entry.records_deleted,
    );
    if let Some(ref error) = entry.error_message {
        line.push_str(&format!(" | error: {}", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_entry_running_pass() {
        let entry = SyncLogEntry {
            id: 7,
            entity_type: "Lead".to_string(),
            sync_mode: "incremental".to_string(),
            status: "started".to_string(),
            records_processed: 0,
            records_created: 0,
            records_updated: 0,
            records_deleted: 0,
            error_message: None,
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            finished_at: None,
        };
        let line = format_entry(&entry);
        assert!(line.starts_with("#7 incremental started"));
        assert!(line.contains("finished=-"));
        assert!(!line.contains("error:"));
    }

    #[test]
    fn test_format_entry_failed_pass() {
        let entry = SyncLogEntry {
            id: 8,
            entity_type: "Lead".to_string(),
            sync_mode: "full".to_string(),
            status: "failed".to_string(),
            records_processed: 2,
            records_created: 0,
            records_updated: 0,
            records_deleted: 0,
            error_message: Some("connection refused".to_string()),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            finished_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap()),
        };
        let line = format_entry(&entry);
        assert!(line.contains("failed"));
        assert!(line.contains("error: connection refused"));
    }
}
