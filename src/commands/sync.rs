// ABOUTME: sync command - triggers one pass per entity, or runs the timer loop
// ABOUTME: Also fronts the daemon lifecycle (--daemon/--stop/--daemon-status)

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;

use crate::config;
use crate::db;
use crate::remote::CrmClient;
use crate::session::SessionStore;
use crate::sync::{
    DaemonConfig, EngineOptions, LeaseRegistry, SyncDaemon, SyncEngine, SyncMode,
};

pub struct SyncOptions {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub entity: Option<String>,
    pub mode: SyncMode,
    pub no_deletes: bool,
    pub watch: bool,
    pub interval: Option<u64>,
    pub daemon: bool,
    pub stop: bool,
    pub daemon_status: bool,
}

pub async fn run(opts: SyncOptions) -> Result<()> {
    if opts.stop {
        if crate::daemon::stop()? {
            println!("Sync daemon stopped.");
        } else {
            println!("No sync daemon is running.");
        }
        return Ok(());
    }

    if opts.daemon_status {
        let status = crate::daemon::check_status()?;
        match status.pid {
            Some(pid) if status.running => println!("Sync daemon is running (pid {}).", pid),
            _ => println!("Sync daemon is not running."),
        }
        return Ok(());
    }

    let sync_config = config::load_sync_config(opts.config_path.as_deref())?;
    let entities = config::resolve_entities(opts.entity.clone(), &sync_config)?;
    let detect_deletes = sync_config.detect_deletes && !opts.no_deletes;

    let credentials = config::resolve_credentials(opts.base_url, opts.username, opts.password)?;
    let database = config::resolve_database(opts.database)?;

    let sessions = SessionStore::new(
        Duration::from_secs(sync_config.session_ttl_secs),
        sync_config.session_capacity,
    );
    let client = CrmClient::new(credentials, sessions, detect_deletes)?;

    let conn = db::open_database(&database)?;
    db::bootstrap(&conn, &entities)?;
    let leases = LeaseRegistry::new();

    if opts.watch || opts.daemon {
        let interval =
            Duration::from_secs(opts.interval.unwrap_or(sync_config.interval_secs).max(1));
        let daemon = SyncDaemon::new(
            DaemonConfig {
                interval,
                entities,
                detect_deletes,
            },
            &client,
            &conn,
            &leases,
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(());
            }
        });

        return daemon.run(shutdown_rx).await;
    }

    for entity in &entities {
        let engine = SyncEngine::new(
            &client,
            &conn,
            &leases,
            EngineOptions {
                entity: entity.clone(),
                detect_deletes,
            },
        );

        let spinner = ProgressBar::new_spinner();
        spinner.set_message(format!("Syncing {} ({})...", entity, opts.mode));
        spinner.enable_steady_tick(Duration::from_millis(120));

        match engine.run(opts.mode).await {
            Ok(outcome) => {
                spinner.finish_with_message(format!("{}: {}", entity, outcome));
            }
            Err(e) => {
                spinner.finish_with_message(format!("{}: sync failed", entity));
                return Err(e).with_context(|| format!("Sync pass for {} failed", entity));
            }
        }
    }

    Ok(())
}
