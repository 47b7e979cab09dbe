// ABOUTME: CRM platform client module
// ABOUTME: HTTP client plus the wire models it exchanges with the CRM REST API

pub mod client;
pub mod models;

pub use client::CrmClient;
pub use models::{DeletedRecord, EntityMetadata, FieldMetadata, RecordPage, RemoteRecord};
