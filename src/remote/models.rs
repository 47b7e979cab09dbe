// ABOUTME: Data structures for the CRM REST API
// ABOUTME: These are deserialized from JSON responses; record bodies pass through unchanged

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record as returned by the CRM: an opaque field mapping tagged with the
/// remote identifier under the `Id` key. The body is kept verbatim so the
/// store can persist it unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    /// The immutable remote identifier, if the payload carries one.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("Id").and_then(Value::as_str)
    }

    /// A string-valued field, or None when absent or non-string.
    pub fn text_field(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    pub records: Vec<RemoteRecord>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedRecord {
    pub id: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedRecordsResponse {
    pub deleted_records: Vec<DeletedRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_record_id_and_fields() {
        let record: RemoteRecord = serde_json::from_value(serde_json::json!({
            "Id": "L1",
            "Name": "Ada Lovelace",
            "AnnualRevenue": 1000
        }))
        .unwrap();

        assert_eq!(record.id(), Some("L1"));
        assert_eq!(record.text_field("Name"), Some("Ada Lovelace".to_string()));
        // Non-string values are not coerced
        assert_eq!(record.text_field("AnnualRevenue"), None);
        assert_eq!(record.text_field("Missing"), None);
    }

    #[test]
    fn test_remote_record_without_id() {
        let record: RemoteRecord =
            serde_json::from_value(serde_json::json!({"Name": "No Id"})).unwrap();
        assert_eq!(record.id(), None);
    }

    #[test]
    fn test_record_page_deserialization() {
        let page: RecordPage = serde_json::from_value(serde_json::json!({
            "records": [{"Id": "L1"}, {"Id": "L2"}],
            "next_cursor": "abc"
        }))
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));

        let last: RecordPage =
            serde_json::from_value(serde_json::json!({"records": []})).unwrap();
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn test_deleted_records_response() {
        let resp: DeletedRecordsResponse = serde_json::from_value(serde_json::json!({
            "deleted_records": [{"id": "L9", "deleted_at": "2024-01-01T00:00:00Z"}, {"id": "L10"}]
        }))
        .unwrap();
        assert_eq!(resp.deleted_records.len(), 2);
        assert_eq!(resp.deleted_records[0].id, "L9");
        assert!(resp.deleted_records[1].deleted_at.is_none());
    }
}
