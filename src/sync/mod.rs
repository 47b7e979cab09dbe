// ABOUTME: Synchronization module - engine, single-flight leases, and the timer daemon
// ABOUTME: One pass per trigger; the daemon turns a timer into incremental triggers

pub mod daemon;
pub mod engine;
pub mod lease;

pub use daemon::{CycleStats, DaemonConfig, SyncDaemon};
pub use engine::{EngineOptions, RemoteSource, SyncEngine, SyncMode, SyncOutcome};
pub use lease::{LeaseGuard, LeaseRegistry};
