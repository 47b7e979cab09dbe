// ABOUTME: Library root for crm-replicator
// ABOUTME: Exposes the sync engine, stores, remote client, and CLI command handlers

pub mod commands;
pub mod config;
pub mod daemon;
pub mod db;
pub mod remote;
pub mod session;
pub mod state;
pub mod store;
pub mod sync;
