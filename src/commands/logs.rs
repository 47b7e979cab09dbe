// ABOUTME: logs command - lists recent sync log entries, newest first

use anyhow::Result;
use std::path::PathBuf;

use super::status::format_entry;
use crate::config;
use crate::db;
use crate::store::sync_log::SyncLogStore;

pub struct LogsOptions {
    pub database: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub entity: Option<String>,
    pub limit: u32,
}

pub fn run(opts: LogsOptions) -> Result<()> {
    let sync_config = config::load_sync_config(opts.config_path.as_deref())?;
    let entities = config::resolve_entities(opts.entity, &sync_config)?;
    let database = config::resolve_database(opts.database)?;

    let conn = db::open_database(&database)?;
    db::bootstrap(&conn, &entities)?;
    let logs = SyncLogStore::new(&conn);

    for entity in &entities {
        let entries = logs.recent(entity, opts.limit)?;
        println!("{} ({} entries)", entity, entries.len());
        for entry in &entries {
            println!("  {}", format_entry(entry));
        }
    }

    Ok(())
}
