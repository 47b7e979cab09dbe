// ABOUTME: Configuration resolution for crm-replicator
// ABOUTME: Merges CLI/env credentials with the optional crm-replicator.toml sync section

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::state;

/// Default local database file, used when no flag, env var, or stored target
/// points elsewhere.
pub const DEFAULT_DATABASE: &str = "crm_sync.db";

/// Credentials and endpoint for the CRM platform.
#[derive(Debug, Clone)]
pub struct CrmCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Sync behavior, loaded from the `[sync]` section of crm-replicator.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Entity types to synchronize
    pub entities: Vec<String>,
    /// Propagate remote deletions as soft deletes (requires a source that
    /// exposes a deleted-records query)
    pub detect_deletes: bool,
    /// Seconds between passes in watch/daemon mode
    pub interval_secs: u64,
    /// Lifetime of a cached CRM session token
    pub session_ttl_secs: u64,
    /// Maximum number of cached session tokens
    pub session_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            entities: vec!["Lead".to_string()],
            detect_deletes: true,
            interval_secs: 3600,
            session_ttl_secs: 1800,
            session_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    sync: SyncConfig,
}

/// Load the sync section from a config file.
///
/// With an explicit path the file must exist and parse; otherwise
/// `crm-replicator.toml` in the working directory is used if present, and
/// defaults apply when it is not.
pub fn load_sync_config(path: Option<&Path>) -> Result<SyncConfig> {
    let path = match path {
        Some(explicit) => {
            if !explicit.exists() {
                anyhow::bail!("Config file not found: {}", explicit.display());
            }
            explicit.to_path_buf()
        }
        None => {
            let default = PathBuf::from("crm-replicator.toml");
            if !default.exists() {
                return Ok(SyncConfig::default());
            }
            default
        }
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    if file.sync.entities.is_empty() {
        anyhow::bail!("Config file {} lists no entities to sync", path.display());
    }

    Ok(file.sync)
}

/// Resolve the local database path: CLI flag (or CRM_DATABASE env via clap),
/// then the stored target, then the default.
pub fn resolve_database(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    let state = state::load().context("Failed to load state")?;
    if let Some(target) = state.database_path {
        return Ok(PathBuf::from(target));
    }
    Ok(PathBuf::from(DEFAULT_DATABASE))
}

/// Resolve the entities a command operates on: an explicit `--entity` flag
/// narrows to one, otherwise the configured list applies. Names are validated
/// before they can reach SQL.
pub fn resolve_entities(flag: Option<String>, config: &SyncConfig) -> Result<Vec<String>> {
    let entities = match flag {
        Some(entity) => vec![entity],
        None => config.entities.clone(),
    };
    for entity in &entities {
        crate::store::records::validate_entity_name(entity)?;
    }
    Ok(entities)
}

/// Resolve CRM credentials from CLI flags and their env fallbacks.
pub fn resolve_credentials(
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<CrmCredentials> {
    let base_url = base_url.ok_or_else(|| {
        anyhow::anyhow!("CRM base URL not provided. Use --base-url or set CRM_BASE_URL")
    })?;
    let username = username.ok_or_else(|| {
        anyhow::anyhow!("CRM username not provided. Use --username or set CRM_USERNAME")
    })?;
    let password = password.ok_or_else(|| {
        anyhow::anyhow!("CRM password not provided. Use --password or set CRM_PASSWORD")
    })?;

    Ok(CrmCredentials {
        base_url,
        username,
        password,
    })
}
