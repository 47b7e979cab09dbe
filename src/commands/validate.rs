// ABOUTME: validate command - checks CRM credentials, entity metadata, and the local database

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::config;
use crate::db;
use crate::remote::CrmClient;
use crate::session::SessionStore;
use crate::store::records::PROJECTED_FIELDS;

pub struct ValidateOptions {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

pub async fn run(opts: ValidateOptions) -> Result<()> {
    let sync_config = config::load_sync_config(opts.config_path.as_deref())?;
    let credentials = config::resolve_credentials(opts.base_url, opts.username, opts.password)?;
    let database = config::resolve_database(opts.database)?;

    println!("Checking CRM connection to {}...", credentials.base_url);
    let sessions = SessionStore::new(
        Duration::from_secs(sync_config.session_ttl_secs),
        sync_config.session_capacity,
    );
    let client = CrmClient::new(credentials, sessions, sync_config.detect_deletes)?;
    client
        .authenticate()
        .await
        .context("CRM authentication check failed")?;
    println!("  Authentication: OK");

    for entity in &sync_config.entities {
        let metadata = client
            .describe(entity)
            .await
            .with_context(|| format!("Failed to describe entity {}", entity))?;
        println!(
            "  {}: {} fields{}",
            entity,
            metadata.fields.len(),
            metadata
                .label
                .map(|l| format!(" ({})", l))
                .unwrap_or_default()
        );

        let missing: Vec<&str> = PROJECTED_FIELDS
            .iter()
            .filter(|wanted| !metadata.fields.iter().any(|f| f.name == **wanted))
            .copied()
            .collect();
        if !missing.is_empty() {
            println!("    warning: entity is missing projected fields: {}", missing.join(", "));
        }
    }

    println!("Checking local database {}...", database.display());
    let conn = db::open_database(&database)?;
    db::bootstrap(&conn, &sync_config.entities)?;
    println!("  Database: OK");

    Ok(())
}
