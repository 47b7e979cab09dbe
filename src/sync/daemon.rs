// ABOUTME: Sync daemon - turns a timer into incremental sync triggers
// ABOUTME: Runs one cycle per tick across all configured entities

use anyhow::Result;
use rusqlite::Connection;
use std::time::Duration;
use tokio::time::interval;

use super::engine::{EngineOptions, RemoteSource, SyncEngine, SyncMode, SyncOutcome};
use super::lease::LeaseRegistry;

/// Configuration for the sync daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interval between sync cycles
    pub interval: Duration,
    /// Entity types synced each cycle
    pub entities: Vec<String>,
    /// Propagate remote deletions (when the source supports it)
    pub detect_deletes: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            entities: vec!["Lead".to_string()],
            detect_deletes: true,
        }
    }
}

/// Statistics from one daemon cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub entities_synced: usize,
    pub totals: SyncOutcome,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CycleStats {
    /// Check if the cycle completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs incremental passes on a timer. One entity's failure does not abort
/// the cycle; it is collected into the cycle stats.
pub struct SyncDaemon<'a, S> {
    config: DaemonConfig,
    source: &'a S,
    conn: &'a Connection,
    leases: &'a LeaseRegistry,
}

impl<'a, S: RemoteSource> SyncDaemon<'a, S> {
    pub fn new(
        config: DaemonConfig,
        source: &'a S,
        conn: &'a Connection,
        leases: &'a LeaseRegistry,
    ) -> Self {
        Self {
            config,
            source,
            conn,
            leases,
        }
    }

    /// Run one incremental pass per configured entity.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let start = std::time::Instant::now();
        let mut stats = CycleStats::default();

        for entity in &self.config.entities {
            let engine = SyncEngine::new(
                self.source,
                self.conn,
                self.leases,
                EngineOptions {
                    entity: entity.clone(),
                    detect_deletes: self.config.detect_deletes,
                },
            );

            match engine.run(SyncMode::Incremental).await {
                Ok(outcome) => {
                    stats.entities_synced += 1;
                    stats.totals.absorb(&outcome);
                }
                Err(e) => {
                    tracing::error!("Failed to sync {}: {:?}", entity, e);
                    stats.errors.push(format!("Failed to sync {}: {:#}", entity, e));
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Run cycles until a shutdown signal arrives. A cycle in flight runs to
    /// completion; shutdown is honored between cycles, never mid-pass.
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        let mut ticker = interval(self.config.interval);
        let mut cycles = 0u64;

        tracing::info!(
            "Starting sync daemon for {:?} with interval {:?}",
            self.config.entities,
            self.config.interval
        );

        loop {
            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping sync daemon");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    tracing::info!("Starting sync cycle {}", cycles);

                    match self.run_cycle().await {
                        Ok(stats) => {
                            tracing::info!(
                                "Sync cycle {} completed: {} entities, {} in {}ms",
                                cycles,
                                stats.entities_synced,
                                stats.totals,
                                stats.duration_ms
                            );
                            if !stats.errors.is_empty() {
                                tracing::warn!("Sync cycle had {} errors", stats.errors.len());
                            }
                        }
                        Err(e) => {
                            tracing::error!("Sync cycle {} failed: {:#}", cycles, e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
