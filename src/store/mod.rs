// ABOUTME: Local store module for synchronized entity records and the sync log
// ABOUTME: All tables live in one SQLite database opened via crate::db

pub mod records;
pub mod sync_log;

pub use records::{RecordStore, StoredRecord, UpsertOutcome};
pub use sync_log::{SyncLogEntry, SyncLogStore};
