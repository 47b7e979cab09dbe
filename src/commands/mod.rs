// ABOUTME: Command implementations for the CLI surface
// ABOUTME: Exports sync, status, logs, validate, and target commands

pub mod logs;
pub mod status;
pub mod sync;
pub mod target;
pub mod validate;
