//! Metadata of an uploaded file.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Document;

/// Collection holding upload metadata.
pub const FILE_COLLECTION: &str = "file";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for FileMeta {
    fn from(doc: Document) -> Self {
        FileMeta {
            original_name: doc.str_field("originalName").unwrap_or_default().to_string(),
            stored_name: doc.str_field("storedName").unwrap_or_default().to_string(),
            content_type: doc
                .str_field("contentType")
                .unwrap_or("application/octet-stream")
                .to_string(),
            size: doc.fields.get("size").and_then(|v| v.as_u64()).unwrap_or(0),
            id: doc.id,
            created_at: doc.created_at,
        }
    }
}
